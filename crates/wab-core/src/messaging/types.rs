use serde::{Deserialize, Serialize};

use crate::domain::{ChatId, UserId};

/// Raw inbound message as delivered by the transport.
///
/// Only the fields the dispatcher needs survive; everything WhatsApp-specific
/// stays in the adapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub chat_id: ChatId,
    /// Author inside a group; absent for direct chats.
    #[serde(default)]
    pub participant: Option<UserId>,
    /// Text payload (`conversation` or extended text). Absent for media without caption.
    #[serde(default)]
    pub text: Option<String>,
    /// Authored by the bot's own account.
    #[serde(default)]
    pub from_me: bool,
    /// False for protocol stubs (receipts, deletions) that carry no message at all.
    #[serde(default = "default_true")]
    pub has_content: bool,
}

fn default_true() -> bool {
    true
}

impl InboundEnvelope {
    pub fn text(chat_id: ChatId, participant: Option<UserId>, text: &str) -> Self {
        Self {
            chat_id,
            participant,
            text: Some(text.to_string()),
            from_me: false,
            has_content: true,
        }
    }

    pub fn sender(&self) -> UserId {
        self.participant
            .clone()
            .unwrap_or_else(|| self.chat_id.as_user())
    }
}

/// A group the bot participates in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: ChatId,
    pub subject: String,
    #[serde(default)]
    pub participants: Vec<UserId>,
}

/// Capabilities / limits of a transport implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_mentions: bool,
    pub supports_channels: bool,
    pub max_message_len: usize,
}
