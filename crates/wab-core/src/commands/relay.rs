use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};

use async_trait::async_trait;
use regex::Regex;

use crate::{
    bulk::NumberedBlocks,
    command::{Category, Command, CommandContext, CommandSpec, Scope},
    domain::ChatId,
    Result,
};

const DEFAULT_RELAY_GROUP: &str = "cleanedmessages";

#[derive(Clone, Copy)]
enum RelayTarget<'a> {
    Group(&'a ChatId),
    Channel(&'a ChatId),
}

/// Stream blocks from `path` to `target`, one send per block, `interval` apart.
async fn relay_file(
    ctx: &CommandContext,
    path: &Path,
    interval: Duration,
    target: RelayTarget<'_>,
) -> Result<usize> {
    let mut sent = 0usize;
    let mut blocks = NumberedBlocks::open(path).await?;
    while let Some(block) = blocks.next_block().await? {
        if sent > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        match target {
            RelayTarget::Group(id) => {
                ctx.send(id, &block, &[]).await?;
            }
            RelayTarget::Channel(id) => ctx.messenger.send_channel_text(id, &block).await?,
        }
        sent += 1;
    }
    Ok(sent)
}

fn missing_file_reply(path: &Path) -> String {
    format!(
        "❌ Extracted file not found. Make sure {} exists at {}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path.display()
    )
}

// ============== sendcleanedmessages ==============

/// Relay the cleaned-messages file into a group.
pub struct SendCleanedMessagesCommand {
    spec: CommandSpec,
    path: PathBuf,
    interval: Duration,
}

impl SendCleanedMessagesCommand {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        Self {
            spec: CommandSpec {
                name: "sendcleanedmessages",
                aliases: &[],
                category: Category::Owner,
                scope: Scope::PrivateOnly,
                owner_only: true,
                description: "Send cleaned_messages.txt to a specific group",
                usage: "sendcleanedmessages \"Group Name\"",
            },
            path,
            interval,
        }
    }

    async fn deliver(&self, ctx: &CommandContext, subject: &str) -> Result<()> {
        let groups = ctx.messenger.list_groups().await?;
        let Some(group) = groups
            .into_iter()
            .find(|g| g.subject.eq_ignore_ascii_case(subject))
        else {
            ctx.reply(&format!(
                "❌ Group \"{}\" not found. Make sure the bot is in that group.",
                subject.to_uppercase()
            ))
            .await?;
            return Ok(());
        };

        let count = relay_file(ctx, &self.path, self.interval, RelayTarget::Group(&group.id)).await?;
        tracing::info!(group = %group.id, count, "relayed cleaned messages");
        ctx.reply(&format!(
            "✅ Sent {count} extracted message(s) to \"{}\".",
            group.subject
        ))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Command for SendCleanedMessagesCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        if !self.path.exists() {
            ctx.reply(&missing_file_reply(&self.path)).await?;
            return Ok(());
        }

        let requested = ctx.args().trim().trim_matches('"').trim();
        let subject = if requested.is_empty() {
            DEFAULT_RELAY_GROUP
        } else {
            requested
        };

        if let Err(e) = self.deliver(ctx, subject).await {
            tracing::error!(error = %e, "relaying cleaned messages failed");
            ctx.reply("❌ Failed to process extracted messages.").await?;
        }
        Ok(())
    }
}

// ============== sendcleanedtochannel ==============

fn channel_arg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+@newsletter)(?:\s|$)").expect("valid regex"))
}

/// Relay the cleaned-messages file into a broadcast channel.
pub struct SendCleanedToChannelCommand {
    spec: CommandSpec,
    path: PathBuf,
    interval: Duration,
}

impl SendCleanedToChannelCommand {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        Self {
            spec: CommandSpec {
                name: "sendcleanedtochannel",
                aliases: &[],
                category: Category::Owner,
                scope: Scope::PrivateOnly,
                owner_only: true,
                description: "Send cleaned messages to a WhatsApp channel",
                usage: "sendcleanedtochannel [channel-jid]",
            },
            path,
            interval,
        }
    }
}

#[async_trait]
impl Command for SendCleanedToChannelCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let Some(caps) = channel_arg_re().captures(ctx.args().trim()) else {
            ctx.reply(&format!(
                "❗ Usage:\n{}sendcleanedtochannel 120363021351234567@newsletter",
                ctx.prefix
            ))
            .await?;
            return Ok(());
        };
        let channel = ChatId::new(&caps[1]);

        if !self.path.exists() {
            ctx.reply(&missing_file_reply(&self.path)).await?;
            return Ok(());
        }

        match relay_file(ctx, &self.path, self.interval, RelayTarget::Channel(&channel)).await {
            Ok(count) => {
                tracing::info!(channel = %channel, count, "relayed cleaned messages to channel");
                ctx.reply(&format!(
                    "✅ Sent {count} cleaned message(s) to channel: {channel}"
                ))
                .await?;
            }
            Err(e) => {
                tracing::error!(channel = %channel, error = %e, "channel relay failed");
                ctx.reply(
                    "❌ Failed to send cleaned messages to channel. Check console for details.",
                )
                .await?;
            }
        }
        Ok(())
    }
}
