use std::time::Duration;

use async_trait::async_trait;

use super::parse_quoted_target;
use crate::{
    command::{Category, Command, CommandContext, CommandSpec, Scope},
    messaging::types::GroupInfo,
    Result,
};

/// Send `text` to every group, mentioning all its participants, sleeping `interval`
/// between sends. Stops at the first transport failure.
async fn send_to_groups(
    ctx: &CommandContext,
    groups: &[GroupInfo],
    text: &str,
    interval: Duration,
) -> Result<usize> {
    for (i, group) in groups.iter().enumerate() {
        if i > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        ctx.send(&group.id, text, &group.participants).await?;
        tracing::debug!(group = %group.id, subject = %group.subject, "broadcast delivered");
    }
    Ok(groups.len())
}

// ============== send ==============

/// Send to the one group whose subject matches exactly (case-insensitive).
pub struct SendCommand {
    spec: CommandSpec,
}

impl SendCommand {
    pub fn new() -> Self {
        Self {
            spec: CommandSpec {
                name: "send",
                aliases: &[],
                category: Category::Private,
                scope: Scope::PrivateOnly,
                owner_only: false,
                description: "Send a message to a specific group",
                usage: "send \"Group Name\" Message",
            },
        }
    }

    async fn deliver(&self, ctx: &CommandContext, name: &str, message: &str) -> Result<()> {
        let groups = ctx.messenger.list_groups().await?;
        let Some(group) = groups
            .into_iter()
            .find(|g| g.subject.to_lowercase() == name.to_lowercase())
        else {
            ctx.reply(&format!(
                "❌ Group \"{name}\" not found. Make sure the bot is in the group."
            ))
            .await?;
            return Ok(());
        };

        ctx.send(&group.id, message, &group.participants).await?;
        ctx.reply(&format!("✅ Message sent to \"{}\"", group.subject))
            .await?;
        Ok(())
    }
}

impl Default for SendCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Command for SendCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let Some((name, message)) = parse_quoted_target(ctx.args()) else {
            ctx.reply(&format!(
                "❗ Correct usage:\n{}send \"Group Name\" Your message here",
                ctx.prefix
            ))
            .await?;
            return Ok(());
        };

        if let Err(e) = self.deliver(ctx, &name, &message).await {
            tracing::error!(group = %name, error = %e, "send to group failed");
            ctx.reply("❌ Failed to send message. Check console for details.")
                .await?;
        }
        Ok(())
    }
}

// ============== sendtogroups ==============

/// Send to every group whose subject starts with a prefix (case-insensitive).
pub struct SendToGroupsCommand {
    spec: CommandSpec,
    interval: Duration,
}

impl SendToGroupsCommand {
    pub fn new(interval: Duration) -> Self {
        Self {
            spec: CommandSpec {
                name: "sendtogroups",
                aliases: &[],
                category: Category::Private,
                scope: Scope::PrivateOnly,
                owner_only: false,
                description: "Send to all groups whose names start with Prefix",
                usage: "sendtogroups \"Prefix\" Message",
            },
            interval,
        }
    }

    async fn deliver(&self, ctx: &CommandContext, prefix: &str, message: &str) -> Result<()> {
        let matched: Vec<GroupInfo> = ctx
            .messenger
            .list_groups()
            .await?
            .into_iter()
            .filter(|g| g.subject.to_lowercase().starts_with(prefix))
            .collect();

        if matched.is_empty() {
            ctx.reply(&format!("❌ No groups found starting with \"{prefix}\"."))
                .await?;
            return Ok(());
        }

        let count = send_to_groups(ctx, &matched, message, self.interval).await?;
        ctx.reply(&format!(
            "✅ Message sent to {count} group(s) starting with \"{prefix}\"."
        ))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Command for SendToGroupsCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let Some((prefix, message)) = parse_quoted_target(ctx.args()) else {
            ctx.reply(&format!(
                "❗ Usage:\n{}sendtogroups \"Group Prefix\" Your message",
                ctx.prefix
            ))
            .await?;
            return Ok(());
        };

        let prefix = prefix.to_lowercase();
        if let Err(e) = self.deliver(ctx, &prefix, &message).await {
            tracing::error!(prefix = %prefix, error = %e, "prefix broadcast failed");
            ctx.reply("❌ Failed to send messages. See console for details.")
                .await?;
        }
        Ok(())
    }
}

// ============== sendtoallgroups ==============

pub struct SendToAllGroupsCommand {
    spec: CommandSpec,
    interval: Duration,
}

impl SendToAllGroupsCommand {
    pub fn new(interval: Duration) -> Self {
        Self {
            spec: CommandSpec {
                name: "sendtoallgroups",
                aliases: &["broadcast"],
                category: Category::Private,
                scope: Scope::PrivateOnly,
                owner_only: false,
                description: "Send to all groups the bot is in",
                usage: "sendtoallgroups Message",
            },
            interval,
        }
    }

    async fn deliver(&self, ctx: &CommandContext, message: &str) -> Result<()> {
        let groups = ctx.messenger.list_groups().await?;
        let count = send_to_groups(ctx, &groups, message, self.interval).await?;
        ctx.reply(&format!("✅ Message sent to {count} group(s)."))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Command for SendToAllGroupsCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let message = ctx.args().trim();
        if message.is_empty() {
            ctx.reply(&format!(
                "❗ Usage:\n{}sendtoallgroups Your message here",
                ctx.prefix
            ))
            .await?;
            return Ok(());
        }

        if let Err(e) = self.deliver(ctx, message).await {
            tracing::error!(error = %e, "broadcast to all groups failed");
            ctx.reply("❌ Failed to send to all groups. Check console for details.")
                .await?;
        }
        Ok(())
    }
}
