use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::types::{GroupInfo, MessagingCapabilities},
    Result,
};

/// Outbound transport port.
///
/// The WhatsApp gateway is the production implementation; tests use an in-memory
/// recorder. Every method is a potential suspension point.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Deliver `text` to `chat_id`, attaching `mentions` (possibly empty).
    async fn send_text(
        &self,
        chat_id: &ChatId,
        text: &str,
        mentions: &[UserId],
    ) -> Result<MessageRef>;

    /// Current participant list of a group chat.
    async fn group_participants(&self, chat_id: &ChatId) -> Result<Vec<UserId>>;

    /// Every group the bot account participates in.
    async fn list_groups(&self) -> Result<Vec<GroupInfo>>;

    /// Post plain text to a broadcast channel (`...@newsletter`).
    async fn send_channel_text(&self, channel_id: &ChatId, text: &str) -> Result<()>;
}
