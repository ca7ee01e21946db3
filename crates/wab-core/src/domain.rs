use std::fmt;

use serde::{Deserialize, Serialize};

const GROUP_SUFFIX: &str = "@g.us";
const USER_SUFFIX: &str = "@s.whatsapp.net";

/// WhatsApp chat JID (group `...@g.us`, direct `...@s.whatsapp.net`, channel `...@newsletter`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

/// WhatsApp participant JID.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Transport-assigned message id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

/// A stable reference to a sent message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_group(&self) -> bool {
        self.0.ends_with(GROUP_SUFFIX)
    }

    /// Direct chats are addressed by the peer's own JID.
    pub fn as_user(&self) -> UserId {
        UserId(self.0.clone())
    }
}

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalize a configured or reported id.
    ///
    /// Bare numbers get the `@s.whatsapp.net` suffix, and a device-qualified phone JID
    /// (`123:7@s.whatsapp.net`) drops its device part. Any other JID (`...@lid`) is kept
    /// verbatim.
    pub fn normalize(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once('@') {
            None => Self(format!("{raw}{USER_SUFFIX}")),
            Some((local, domain)) if USER_SUFFIX.strip_prefix('@') == Some(domain) => {
                let number = local.split(':').next().unwrap_or_default();
                Self(format!("{number}{USER_SUFFIX}"))
            }
            Some(_) => Self(raw.to_string()),
        }
    }

    /// The direct chat with this user.
    pub fn as_chat(&self) -> ChatId {
        ChatId(self.0.clone())
    }

    /// Local part used for visible `@number` mentions.
    pub fn handle(&self) -> &str {
        self.0.split('@').next().unwrap_or_default()
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
