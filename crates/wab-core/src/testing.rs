//! In-memory transport used by unit tests across the crate.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{GroupInfo, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sent {
    pub chat_id: ChatId,
    pub text: String,
    pub mentions: Vec<UserId>,
}

#[derive(Default)]
pub struct RecordingMessenger {
    next_id: Mutex<u64>,
    groups: Mutex<Vec<GroupInfo>>,
    sent: Mutex<Vec<Sent>>,
    channel_sent: Mutex<Vec<(ChatId, String)>>,
    fail_group_reads: Mutex<bool>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(self, id: &str, subject: &str, participants: &[&str]) -> Self {
        self.groups.lock().unwrap().push(GroupInfo {
            id: ChatId::new(id),
            subject: subject.to_string(),
            participants: participants.iter().map(|p| UserId::new(*p)).collect(),
        });
        self
    }

    pub fn fail_group_reads(&self) {
        *self.fail_group_reads.lock().unwrap() = true;
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: &str) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.chat_id.as_str() == chat_id)
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.text).collect()
    }

    pub fn channel_sent(&self) -> Vec<(ChatId, String)> {
        self.channel_sent.lock().unwrap().clone()
    }

    fn check_reads(&self) -> Result<()> {
        if *self.fail_group_reads.lock().unwrap() {
            return Err(Error::Transport("group metadata unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_mentions: true,
            supports_channels: true,
            max_message_len: 65_536,
        }
    }

    async fn send_text(
        &self,
        chat_id: &ChatId,
        text: &str,
        mentions: &[UserId],
    ) -> Result<MessageRef> {
        self.sent.lock().unwrap().push(Sent {
            chat_id: chat_id.clone(),
            text: text.to_string(),
            mentions: mentions.to_vec(),
        });
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        Ok(MessageRef {
            chat_id: chat_id.clone(),
            message_id: MessageId(guard.to_string()),
        })
    }

    async fn group_participants(&self, chat_id: &ChatId) -> Result<Vec<UserId>> {
        self.check_reads()?;
        self.groups
            .lock()
            .unwrap()
            .iter()
            .find(|g| &g.id == chat_id)
            .map(|g| g.participants.clone())
            .ok_or_else(|| Error::Transport(format!("unknown group {chat_id}")))
    }

    async fn list_groups(&self) -> Result<Vec<GroupInfo>> {
        self.check_reads()?;
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn send_channel_text(&self, channel_id: &ChatId, text: &str) -> Result<()> {
        self.channel_sent
            .lock()
            .unwrap()
            .push((channel_id.clone(), text.to_string()));
        Ok(())
    }
}
