//! WhatsApp gateway adapter.
//!
//! Implements the `wab-core` MessagingPort over the HTTP JSON API of a
//! WhatsApp-Web gateway sidecar. The sidecar owns pairing, credentials and
//! reconnection; this crate only sends, lists and long-polls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::time::sleep;

pub mod router;

use wab_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{GroupInfo, InboundEnvelope, MessagingCapabilities},
    },
    Result,
};

/// One long-poll result.
#[derive(Debug, Deserialize)]
pub struct EventBatch {
    /// Pass back as `after` on the next poll.
    pub cursor: u64,
    #[serde(default)]
    pub events: Vec<InboundEnvelope>,
}

/// Source of inbound envelopes for [`router::poll_loop`].
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn next_batch(&self, after: u64, timeout: Duration) -> Result<EventBatch>;
}

#[derive(Serialize)]
struct SendTextRequest<'a> {
    chat_id: &'a ChatId,
    text: &'a str,
    mentions: &'a [UserId],
}

#[derive(Serialize)]
struct ChannelPostRequest<'a> {
    channel_id: &'a ChatId,
    text: &'a str,
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Clone)]
pub struct GatewayMessenger {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GatewayMessenger {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn map_err(path: &str, e: reqwest::Error) -> Error {
        Error::Transport(format!("gateway {path}: {e}"))
    }

    /// Send the request built by `op`, retrying once on 429 after `Retry-After`.
    async fn with_retry(&self, path: &str, op: impl Fn() -> RequestBuilder) -> Result<Response> {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            let resp = op().send().await.map_err(|e| Self::map_err(path, e))?;
            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempts < MAX_RETRIES {
                attempts += 1;
                let wait = retry_after(&resp);
                tracing::warn!(path, wait_ms = wait.as_millis() as u64, "gateway rate limited");
                sleep(wait).await;
                continue;
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Transport(format!(
                    "gateway {path}: HTTP {status}: {}",
                    body.trim()
                )));
            }
            return Ok(resp);
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .with_retry(path, || self.request(Method::GET, path))
            .await?;
        resp.json().await.map_err(|e| Self::map_err(path, e))
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .with_retry(path, || self.request(Method::POST, path).json(body))
            .await?;
        resp.json().await.map_err(|e| Self::map_err(path, e))
    }

    /// The paired account's own JID, without the device suffix.
    pub async fn me(&self) -> Result<UserId> {
        let me: IdResponse = self.get_json("/me").await?;
        Ok(UserId::normalize(&me.id))
    }
}

fn retry_after(resp: &Response) -> Duration {
    resp.headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(parse_retry_after)
        .unwrap_or(Duration::from_secs(1))
}

fn parse_retry_after(value: &str) -> Duration {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(1))
}

#[async_trait]
impl EventSource for GatewayMessenger {
    async fn next_batch(&self, after: u64, timeout: Duration) -> Result<EventBatch> {
        let path = "/events";
        let resp = self
            .with_retry(path, || {
                self.request(Method::GET, path)
                    .query(&[("after", after), ("timeout", timeout.as_secs())])
                    .timeout(timeout + Duration::from_secs(10))
            })
            .await?;
        resp.json().await.map_err(|e| Self::map_err(path, e))
    }
}

#[async_trait]
impl MessagingPort for GatewayMessenger {
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
        let sent: IdResponse = self
            .post_json(
                "/messages",
                &SendTextRequest {
                    chat_id,
                    text,
                    mentions,
                },
            )
            .await?;
        Ok(MessageRef {
            chat_id: chat_id.clone(),
            message_id: MessageId(sent.id),
        })
    }

    async fn group_participants(&self, chat_id: &ChatId) -> Result<Vec<UserId>> {
        let group: GroupInfo = self.get_json(&format!("/groups/{chat_id}")).await?;
        Ok(group.participants)
    }

    async fn list_groups(&self) -> Result<Vec<GroupInfo>> {
        self.get_json("/groups").await
    }

    async fn send_channel_text(&self, channel_id: &ChatId, text: &str) -> Result<()> {
        let path = "/channels/messages";
        let body = ChannelPostRequest { channel_id, text };
        self.with_retry(path, || self.request(Method::POST, path).json(&body))
            .await?;
        Ok(())
    }
}
