//! The single delivery-queue consumer (spec §4.6).
//!
//! Formats each [`Notification`] into the literal block spec §4.6 specifies
//! and calls the addressed platform's [`Transport::send_text`]. Send
//! failures are logged and not retried in the core (spec §7).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::event::{Notification, Platform};
use crate::store::Store;
use crate::transport::Transport;

/// Render a [`Notification`] into the human-readable block spec §4.6
/// specifies, verbatim.
pub fn format_notification(n: &Notification) -> String {
    format!(
        "In application: {}\nTopic was detected: [{}]\nIn channel: {}\nSummary: {}\nlink: {}",
        n.platform, n.topics_joined, n.channel_display, n.summary, n.link
    )
}

/// Spawn the sender loop: pops notifications off `rx` until it is closed and
/// drained (spec §5 shutdown: "the sender drains `delivery_q`").
///
/// `transports` maps each deliverable platform to its [`Transport`]; a
/// notification addressed to a platform with no registered transport is
/// logged and dropped.
pub fn spawn(
    mut rx: mpsc::Receiver<Notification>,
    store: Arc<dyn Store>,
    transports: HashMap<Platform, Arc<dyn Transport>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            deliver(&notification, &store, &transports).await;
        }
        tracing::debug!("sender drained and stopped");
    })
}

async fn deliver(
    notification: &Notification,
    store: &Arc<dyn Store>,
    transports: &HashMap<Platform, Arc<dyn Transport>>,
) {
    let Some(transport) = transports.get(&notification.platform) else {
        warn!(
            user = %notification.user,
            platform = %notification.platform,
            "no transport registered for platform, dropping notification"
        );
        return;
    };

    let transport_id = match store.get_id(&notification.user).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            warn!(user = %notification.user, "no transport id known for user, dropping notification");
            return;
        }
        Err(err) => {
            error!(user = %notification.user, error = %err, "store error resolving transport id");
            return;
        }
    };

    let text = format_notification(notification);
    if let Err(err) = transport.send_text(&transport_id, &text).await {
        error!(
            user = %notification.user,
            platform = %notification.platform,
            error = %err,
            "failed to send notification"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformApiError;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn format_matches_literal_spec_block() {
        let n = Notification {
            user: "alice".to_string(),
            platform: Platform::Telegram,
            channel_display: "Rust News".to_string(),
            topics_joined: "rust, wasm".to_string(),
            summary: "New Rust release".to_string(),
            link: "https://t.me/news/1".to_string(),
        };
        let rendered = format_notification(&n);
        assert_eq!(
            rendered,
            "In application: TG\n\
             Topic was detected: [rust, wasm]\n\
             In channel: Rust News\n\
             Summary: New Rust release\n\
             link: https://t.me/news/1"
        );
    }

    struct RecordingTransport {
        platform: Platform,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn send_text(&self, transport_id: &str, text: &str) -> Result<(), PlatformApiError> {
            self.sent
                .lock()
                .expect("mutex poisoned")
                .push((transport_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_to_registered_transport_using_resolved_id() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        store.add_user("alice", "12345").await.unwrap();

        let transport = Arc::new(RecordingTransport {
            platform: Platform::Telegram,
            sent: Mutex::new(Vec::new()),
        });
        let mut transports: HashMap<Platform, Arc<dyn Transport>> = HashMap::new();
        transports.insert(Platform::Telegram, transport.clone() as Arc<dyn Transport>);

        let (tx, rx) = mpsc::channel(4);
        let handle = spawn(rx, store, transports);

        tx.send(Notification {
            user: "alice".to_string(),
            platform: Platform::Telegram,
            channel_display: "Rust News".to_string(),
            topics_joined: "rust".to_string(),
            summary: "hi".to_string(),
            link: "https://t.me/news/1".to_string(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let sent = transport.sent.lock().expect("mutex poisoned");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "12345");
        assert!(sent[0].1.contains("rust"));
    }

    #[tokio::test]
    async fn unknown_user_is_dropped_without_panic() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let transport = Arc::new(RecordingTransport {
            platform: Platform::Telegram,
            sent: Mutex::new(Vec::new()),
        });
        let mut transports: HashMap<Platform, Arc<dyn Transport>> = HashMap::new();
        transports.insert(Platform::Telegram, transport.clone() as Arc<dyn Transport>);

        let (tx, rx) = mpsc::channel(4);
        let handle = spawn(rx, store, transports);
        tx.send(Notification {
            user: "ghost".to_string(),
            platform: Platform::Telegram,
            channel_display: "x".to_string(),
            topics_joined: "x".to_string(),
            summary: "x".to_string(),
            link: "x".to_string(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(transport.sent.lock().expect("mutex poisoned").is_empty());
    }

    #[tokio::test]
    async fn missing_transport_is_dropped_without_panic() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        store.add_user("alice", "1").await.unwrap();
        let transports: HashMap<Platform, Arc<dyn Transport>> = HashMap::new();

        let (tx, rx) = mpsc::channel(4);
        let handle = spawn(rx, store, transports);
        tx.send(Notification {
            user: "alice".to_string(),
            platform: Platform::Mattermost,
            channel_display: "x".to_string(),
            topics_joined: "x".to_string(),
            summary: "x".to_string(),
            link: "x".to_string(),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
