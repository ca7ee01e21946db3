use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    command::{Category, Command, CommandContext, CommandSpec, Scope},
    settings::{ChatFlag, SettingsStore},
    Result,
};

// ============== ping ==============

pub struct PingCommand {
    spec: CommandSpec,
}

impl PingCommand {
    pub fn new() -> Self {
        Self {
            spec: CommandSpec {
                name: "ping",
                aliases: &[],
                category: Category::Group,
                scope: Scope::Any,
                owner_only: false,
                description: "Test bot responsiveness",
                usage: "ping",
            },
        }
    }
}

impl Default for PingCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Command for PingCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        ctx.reply("🏓 Pong!").await?;
        Ok(())
    }
}

// ============== help ==============

pub struct HelpCommand {
    spec: CommandSpec,
    bot_name: String,
}

impl HelpCommand {
    pub fn new(bot_name: &str) -> Self {
        Self {
            spec: CommandSpec {
                name: "help",
                aliases: &["commands"],
                category: Category::Group,
                scope: Scope::Any,
                owner_only: false,
                description: "Show this command list",
                usage: "help",
            },
            bot_name: bot_name.to_string(),
        }
    }

    fn render(&self, ctx: &CommandContext) -> String {
        let mut lines = vec![format!("*🤖 {} Command List*", self.bot_name)];

        for category in Category::ALL {
            let specs: Vec<&CommandSpec> = ctx
                .registry
                .iter()
                .map(|c| c.spec())
                .filter(|s| s.category == category)
                .collect();
            if specs.is_empty() {
                continue;
            }

            lines.push(String::new());
            lines.push(
                match category {
                    Category::Group => "📌 _Group Commands (usable in groups):_",
                    Category::Private => "📬 _Private Commands (send to bot in DM):_",
                    Category::Owner => "👑 _Owner Commands (bot owner only):_",
                }
                .to_string(),
            );
            for spec in specs {
                lines.push(format!("• *{}* – {}", ctx.usage(spec), spec.description));
            }
        }

        lines.push(String::new());
        lines.push("✅ All broadcast messages include silent mentions.".to_string());
        lines.push("🔒 Owner commands are restricted to configured owners.".to_string());
        lines.join("\n")
    }
}

#[async_trait]
impl Command for HelpCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        ctx.reply(&self.render(ctx)).await?;
        Ok(())
    }
}

// ============== all ==============

/// Visible mention of every participant.
pub struct AllCommand {
    spec: CommandSpec,
}

impl AllCommand {
    pub fn new() -> Self {
        Self {
            spec: CommandSpec {
                name: "all",
                aliases: &["everyone"],
                category: Category::Group,
                scope: Scope::GroupOnly,
                owner_only: false,
                description: "Mention all visibly in group",
                usage: "all",
            },
        }
    }
}

impl Default for AllCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Command for AllCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let participants = ctx.messenger.group_participants(ctx.chat_id()).await?;
        let handles = participants
            .iter()
            .map(|p| format!("@{}", p.handle()))
            .collect::<Vec<_>>()
            .join(" ");
        ctx.send(ctx.chat_id(), &format!("👋 {handles}"), &participants)
            .await?;
        Ok(())
    }
}

// ============== say ==============

/// Repeat the argument with every participant silently mentioned.
pub struct SayCommand {
    spec: CommandSpec,
}

impl SayCommand {
    pub fn new() -> Self {
        Self {
            spec: CommandSpec {
                name: "say",
                aliases: &[],
                category: Category::Group,
                scope: Scope::GroupOnly,
                owner_only: false,
                description: "Bot sends [message] with silent mentions",
                usage: "say [message]",
            },
        }
    }
}

impl Default for SayCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Command for SayCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let message = ctx.args().trim();
        if message.is_empty() {
            ctx.reply(&format!("❗ Usage: {}say Your message here", ctx.prefix))
                .await?;
            return Ok(());
        }

        let participants = ctx.messenger.group_participants(ctx.chat_id()).await?;
        ctx.send(ctx.chat_id(), message, &participants).await?;
        Ok(())
    }
}

// ============== multitag ==============

/// Toggle silent tag-all re-broadcasting for the invoking group.
pub struct MultiTagCommand {
    spec: CommandSpec,
    settings: Arc<SettingsStore>,
}

impl MultiTagCommand {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self {
            spec: CommandSpec {
                name: "multitag",
                aliases: &[],
                category: Category::Group,
                scope: Scope::GroupOnly,
                owner_only: false,
                description: "Enable or disable silent tag-all for this group",
                usage: "multitag on|off",
            },
            settings,
        }
    }
}

#[async_trait]
impl Command for MultiTagCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let enabled = match ctx.args().trim().to_lowercase().as_str() {
            "on" => true,
            "off" => false,
            _ => {
                let p = &ctx.prefix;
                ctx.reply(&format!("❗ Usage: {p}multitag on OR {p}multitag off"))
                    .await?;
                return Ok(());
            }
        };

        // The flag is live in memory either way; a failed flush only costs durability.
        if let Err(e) = self
            .settings
            .set(ctx.chat_id(), ChatFlag::MultiTag, enabled)
        {
            tracing::warn!(chat = %ctx.chat_id(), error = %e, "failed to persist multi-tag flag");
        }

        let text = if enabled {
            "✅ Multi-tag is now ON."
        } else {
            "🚫 Multi-tag is now OFF."
        };
        ctx.reply(text).await?;
        Ok(())
    }
}
