//! Telegram-style bot adapter (spec §4.3): long-polls `getUpdates`, turns
//! channel posts and supergroup messages into [`Event`]s, and upserts the
//! private-channel display-name cache the first time a channel/group is
//! seen.
//!
//! Shaped like the teacher's original Telegram adapter: a `reqwest`-backed
//! polling loop with exponential backoff on transport errors, a minimal
//! subset of the Bot API's JSON shapes, and `tracing` at every suspension
//! point.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::event::{Event, Platform};
use crate::store::Store;

/// Initial backoff on poll failure, in milliseconds (spec §5 "Suspension
/// points" — every outbound call has bounded retry behavior).
const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum backoff on poll failure, in milliseconds.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Extra seconds added to the HTTP timeout beyond the long-poll timeout, so
/// the TCP socket stays open while Telegram holds the request.
const POLL_TIMEOUT_MARGIN_SECS: u64 = 10;

/// Telegram adapter errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The Telegram API returned `ok: false`.
    #[error("Telegram API error: {0}")]
    Api(String),
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
    channel_post: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    chat: TelegramChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
    #[serde(rename = "type")]
    chat_type: String,
    username: Option<String>,
    title: Option<String>,
}

/// Configuration for [`spawn`].
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot API token.
    pub bot_token: String,
    /// Long-poll timeout for `getUpdates`, in seconds.
    pub poll_timeout_secs: u32,
}

/// Strip the well-known `-100` prefix Telegram uses on private
/// supergroup/channel ids (spec §4.3, §9).
fn strip_channel_id_prefix(id: i64) -> String {
    let raw = id.to_string();
    raw.strip_prefix("-100")
        .map(str::to_string)
        .unwrap_or_else(|| raw.trim_start_matches('-').to_string())
}

/// Normalize a channel post or supergroup message into the pipeline's
/// internal [`Event`] type, and report the channel id/display name pair for
/// upserting into the private-channel-name cache when the channel has no
/// public username (spec §4.3).
fn normalize(msg: &TelegramMessage) -> Option<(Event, Option<(String, String)>)> {
    let text = msg.text.clone()?;
    let is_public = msg.chat.username.is_some();
    let (channel_id, display_name, link) = if let Some(username) = &msg.chat.username {
        (
            username.clone(),
            username.clone(),
            format!("https://t.me/{username}/{}", msg.message_id),
        )
    } else {
        let stripped = strip_channel_id_prefix(msg.chat.id);
        let title = msg.chat.title.clone().unwrap_or_else(|| stripped.clone());
        (
            stripped.clone(),
            title,
            format!("https://t.me/c/{stripped}/{}", msg.message_id),
        )
    };

    let event = Event::new(
        Platform::Telegram,
        display_name.clone(),
        channel_id.clone(),
        text,
        link,
        msg.message_id.to_string(),
    );
    let cache_upsert = if is_public {
        None
    } else {
        Some((channel_id, display_name))
    };
    Some((event, cache_upsert))
}

/// Whether this update's message originates from a broadcast channel or a
/// group/supergroup — both are treated as posts (spec §4.3: "any group
/// member's message is a post").
fn is_post(chat_type: &str) -> bool {
    matches!(chat_type, "channel" | "group" | "supergroup")
}

/// Run the Telegram long-poll loop until the process is shut down
/// (cooperative cancellation via `shutdown`). Normalizes broadcast-channel
/// posts and supergroup messages into events and enqueues them onto the
/// dispatcher; direct messages to the bot are out of core (spec §1, §4.3)
/// and are only logged.
pub async fn run(
    config: TelegramConfig,
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let client = reqwest::Client::new();
    let mut offset: Option<i64> = None;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    info!("Telegram adapter starting");
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            result = poll_updates(&client, &config, offset) => {
                match result {
                    Ok(updates) => {
                        backoff_ms = INITIAL_BACKOFF_MS;
                        for update in updates {
                            offset = Some(update.update_id.saturating_add(1));
                            handle_update(update, &store, &dispatcher).await;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, backoff_ms, "Telegram poll error, backing off");
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms = backoff_ms.saturating_mul(2).min(MAX_BACKOFF_MS);
                    }
                }
            }
        }
    }
    info!("Telegram adapter stopped");
}

async fn handle_update(update: TelegramUpdate, store: &Arc<dyn Store>, dispatcher: &Dispatcher) {
    let Some(msg) = update.channel_post.or(update.message) else {
        return;
    };
    if !is_post(&msg.chat.chat_type) {
        // Direct message to the bot: command-parsing front-end territory,
        // out of core (spec §1, §4.3).
        debug!(chat_id = msg.chat.id, "ignoring Telegram DM (command front-end is out of core)");
        return;
    }
    let Some((event, cache_upsert)) = normalize(&msg) else {
        return;
    };
    if let Some((channel_id, display_name)) = cache_upsert {
        if let Err(err) = store
            .put_chan_name(Platform::Telegram, &channel_id, &display_name)
            .await
        {
            warn!(%channel_id, error = %err, "failed to cache Telegram channel name");
        }
    }
    if dispatcher.enqueue(event).await.is_err() {
        warn!("dispatcher shard closed, dropping Telegram event");
    }
}

async fn poll_updates(
    client: &reqwest::Client,
    config: &TelegramConfig,
    offset: Option<i64>,
) -> Result<Vec<TelegramUpdate>, AdapterError> {
    let url = format!(
        "https://api.telegram.org/bot{}/getUpdates",
        config.bot_token
    );
    let mut params = serde_json::json!({ "timeout": config.poll_timeout_secs });
    if let Some(off) = offset {
        params["offset"] = serde_json::Value::from(off);
    }

    let http_timeout = Duration::from_secs(
        u64::from(config.poll_timeout_secs).saturating_add(POLL_TIMEOUT_MARGIN_SECS),
    );
    let response = client
        .post(url)
        .json(&params)
        .timeout(http_timeout)
        .send()
        .await?;
    let parsed: TelegramResponse<Vec<TelegramUpdate>> = response.json().await?;
    if !parsed.ok {
        return Err(AdapterError::Api(
            parsed.description.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(parsed.result.unwrap_or_default())
}
