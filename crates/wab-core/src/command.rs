//! The command capability: static metadata plus an async `execute`.
//!
//! Commands never throw for user mistakes (bad arguments, unknown group). They reply
//! with a corrective message and return `Ok(())`. An `Err` means something
//! unexpected happened and is handled by the dispatcher's error boundary.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::port::MessagingPort,
    registry::CommandRegistry,
    Result,
};

/// Where a command may run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    GroupOnly,
    PrivateOnly,
    Any,
}

/// Help-listing section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Group,
    Private,
    Owner,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Group, Category::Private, Category::Owner];
}

/// Static descriptor metadata.
#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub category: Category,
    pub scope: Scope,
    pub owner_only: bool,
    pub description: &'static str,
    pub usage: &'static str,
}

impl CommandSpec {
    /// Name followed by aliases, i.e. every key this command is reachable under.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn spec(&self) -> &CommandSpec;

    async fn execute(&self, ctx: &CommandContext) -> Result<()>;
}

/// Per-message facts, derived once at ingest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageContext {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub is_group: bool,
    pub raw_text: String,
    /// Authored by the bot account inside its own self-chat.
    pub is_self: bool,
}

/// Parsed `!name args`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub args: String,
}

impl Invocation {
    /// Parse `text` as `<prefix><name>[<whitespace><args>]`.
    ///
    /// `name` is a non-empty run of ASCII alphanumerics/underscores that must end
    /// the text or be followed by whitespace; anything else is not an invocation.
    pub fn parse(prefix: &str, text: &str) -> Option<Self> {
        let rest = text.strip_prefix(prefix)?;
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }

        let (name, tail) = rest.split_at(end);
        if !tail.is_empty() && !tail.starts_with(char::is_whitespace) {
            return None;
        }

        Some(Self {
            name: name.to_ascii_lowercase(),
            args: tail.trim_start().to_string(),
        })
    }
}

/// Sender ids granted elevated permissions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnerSet(HashSet<UserId>);

impl OwnerSet {
    pub fn contains(&self, id: &UserId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<UserId> for OwnerSet {
    fn from_iter<T: IntoIterator<Item = UserId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything a command may touch while executing.
#[derive(Clone)]
pub struct CommandContext {
    pub messenger: Arc<dyn MessagingPort>,
    pub message: MessageContext,
    pub invocation: Invocation,
    pub owners: Arc<OwnerSet>,
    /// Snapshot the invocation was resolved against.
    pub registry: Arc<CommandRegistry>,
    /// Configured command prefix, for rendering usage lines.
    pub prefix: String,
}

impl CommandContext {
    pub fn chat_id(&self) -> &ChatId {
        &self.message.chat_id
    }

    pub fn args(&self) -> &str {
        &self.invocation.args
    }

    /// `spec.usage` with the live prefix in front.
    pub fn usage(&self, spec: &CommandSpec) -> String {
        format!("{}{}", self.prefix, spec.usage)
    }

    /// Plain reply into the originating chat.
    pub async fn reply(&self, text: &str) -> Result<MessageRef> {
        self.messenger.send_text(&self.message.chat_id, text, &[]).await
    }

    pub async fn send(
        &self,
        chat_id: &ChatId,
        text: &str,
        mentions: &[UserId],
    ) -> Result<MessageRef> {
        self.messenger.send_text(chat_id, text, mentions).await
    }
}
