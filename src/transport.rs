//! The outbound send primitive per platform (spec §4.6), used by the
//! [`crate::sender`].

use async_trait::async_trait;

use crate::error::PlatformApiError;
use crate::event::Platform;

/// A platform's outbound message-send primitive.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which platform this transport addresses.
    fn platform(&self) -> Platform;

    /// Send `text` to `transport_id` (the opaque address `Store::get_id`
    /// returned for the recipient).
    ///
    /// # Errors
    ///
    /// Returns [`PlatformApiError`] on a network failure or a non-2xx/
    /// `ok: false` response from the host API.
    async fn send_text(&self, transport_id: &str, text: &str) -> Result<(), PlatformApiError>;
}

/// Sends messages via the Telegram Bot API `sendMessage` method.
pub struct TelegramTransport {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramTransport {
    /// Construct a transport bound to `bot_token`.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn send_text(&self, transport_id: &str, text: &str) -> Result<(), PlatformApiError> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.bot_token
        );
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "chat_id": transport_id, "text": text }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PlatformApiError::Api(format!(
                "telegram sendMessage returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Sends messages via the Mattermost REST API `POST /api/v4/posts`.
pub struct MattermostTransport {
    server_url: String,
    token: String,
    client: reqwest::Client,
}

impl MattermostTransport {
    /// Construct a transport bound to `server_url` and a personal access
    /// `token`.
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for MattermostTransport {
    fn platform(&self) -> Platform {
        Platform::Mattermost
    }

    /// `transport_id` here is the Mattermost direct-message channel id the
    /// recipient's `get_id` entry resolved to.
    async fn send_text(&self, transport_id: &str, text: &str) -> Result<(), PlatformApiError> {
        let url = format!("{}/api/v4/posts", self.server_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "channel_id": transport_id, "message": text }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PlatformApiError::Api(format!(
                "mattermost create-post returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}
