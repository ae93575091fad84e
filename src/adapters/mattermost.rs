//! Mattermost-style team chat adapter (spec §4.5): a websocket event stream
//! that reconnects on disconnect with a bounded fixed backoff.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::PlatformApiError;
use crate::event::{Event, Platform};

/// Reconnect delay after a dropped websocket connection (spec §4.5: "1 s
/// fixed delay, log-and-retry loop").
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Mattermost adapter configuration.
#[derive(Debug, Clone)]
pub struct MattermostConfig {
    /// Base HTTP(S) URL of the Mattermost server (used to build post links
    /// and the derived websocket URL).
    pub server_url: String,
    /// Team name, used to build post links (`{server}/{team}/pl/{post_id}`).
    pub team: String,
    /// Personal access token used to authenticate the websocket connection.
    pub token: String,
}

impl MattermostConfig {
    /// The websocket URL derived from `server_url`
    /// (`https://` → `wss://`, `http://` → `ws://`, `/api/v4/websocket`
    /// appended).
    fn websocket_url(&self) -> String {
        let ws_base = if let Some(rest) = self.server_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.server_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.server_url.clone()
        };
        format!("{ws_base}/api/v4/websocket")
    }
}

/// A Mattermost websocket event envelope. Only the fields the core needs
/// are modeled; everything else is ignored.
#[derive(Debug, Deserialize)]
struct WsEvent {
    event: String,
    data: Option<WsEventData>,
}

#[derive(Debug, Deserialize)]
struct WsEventData {
    /// The post payload, itself JSON-encoded as a string by the Mattermost
    /// API.
    post: Option<String>,
    channel_type: Option<String>,
}

/// The subset of a Mattermost `Post` object the core needs.
#[derive(Debug, Deserialize)]
struct MattermostPost {
    id: String,
    channel_id: String,
    message: String,
}

/// Authenticate the websocket connection (Mattermost's `authentication_challenge`
/// action, sent as the first frame after connecting).
fn auth_frame(token: &str) -> String {
    serde_json::json!({
        "seq": 1,
        "action": "authentication_challenge",
        "data": { "token": token },
    })
    .to_string()
}

/// Spawn the Mattermost listener as a long-lived task. Reconnects on
/// disconnect with [`RECONNECT_DELAY`] (spec §4.5).
pub fn spawn(config: MattermostConfig, dispatcher: Arc<Dispatcher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match run_once(&config, &dispatcher).await {
                Ok(()) => info!("Mattermost websocket closed cleanly, reconnecting"),
                Err(err) => warn!(error = %err, "Mattermost websocket error, reconnecting"),
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    })
}

async fn run_once(config: &MattermostConfig, dispatcher: &Dispatcher) -> Result<(), PlatformApiError> {
    let url = config.websocket_url();
    let (mut stream, _response) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|e| PlatformApiError::Disconnected(e.to_string()))?;

    stream
        .send(WsMessage::Text(auth_frame(&config.token)))
        .await
        .map_err(|e| PlatformApiError::Disconnected(e.to_string()))?;

    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| PlatformApiError::Disconnected(e.to_string()))?;
        let WsMessage::Text(text) = frame else {
            continue;
        };
        handle_frame(&text, config, dispatcher).await;
    }
    Ok(())
}

async fn handle_frame(text: &str, config: &MattermostConfig, dispatcher: &Dispatcher) {
    let event: WsEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            debug!(error = %err, "ignoring unparseable Mattermost websocket frame");
            return;
        }
    };
    if event.event != "posted" {
        return;
    }
    let Some(data) = event.data else { return };
    let Some(post_json) = data.post else { return };
    let post: MattermostPost = match serde_json::from_str(&post_json) {
        Ok(post) => post,
        Err(err) => {
            debug!(error = %err, "ignoring unparseable Mattermost post payload");
            return;
        }
    };

    if data.channel_type.as_deref() == Some("D") {
        // Direct message: command-parsing front-end territory, out of core
        // (spec §1, §4.5).
        debug!(channel_id = %post.channel_id, "ignoring Mattermost DM (command front-end is out of core)");
        return;
    }

    let link = format!("{}/{}/pl/{}", config.server_url, config.team, post.id);
    let ev = Event::new(
        Platform::Mattermost,
        post.channel_id.clone(),
        post.channel_id,
        post.message,
        link,
        post.id,
    );
    if dispatcher.enqueue(ev).await.is_err() {
        warn!("dispatcher shard closed, dropping Mattermost event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(server_url: &str) -> MattermostConfig {
        MattermostConfig {
            server_url: server_url.to_string(),
            team: "team".to_string(),
            token: "tok".to_string(),
        }
    }

    #[test]
    fn websocket_url_upgrades_https_to_wss() {
        assert_eq!(
            cfg("https://chat.example.com").websocket_url(),
            "wss://chat.example.com/api/v4/websocket"
        );
    }

    #[test]
    fn websocket_url_upgrades_http_to_ws() {
        assert_eq!(
            cfg("http://localhost:8065").websocket_url(),
            "ws://localhost:8065/api/v4/websocket"
        );
    }

    #[test]
    fn auth_frame_embeds_token() {
        let frame = auth_frame("secret-token");
        assert!(frame.contains("authentication_challenge"));
        assert!(frame.contains("secret-token"));
    }

    #[tokio::test]
    async fn non_posted_event_frames_are_ignored() {
        // direct field construction isn't reachable outside the module;
        // exercise via the public parsing entry point instead.
        let raw = r#"{"event":"hello","data":null}"#;
        let parsed: WsEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.event, "hello");
        assert!(parsed.data.is_none());
    }

    #[test]
    fn post_payload_parses_nested_json_string() {
        let raw = r#"{"id":"p1","channel_id":"c1","message":"hello rust"}"#;
        let post: MattermostPost = serde_json::from_str(raw).unwrap();
        assert_eq!(post.channel_id, "c1");
        assert_eq!(post.message, "hello rust");
    }
}
