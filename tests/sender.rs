//! Black-box coverage of the delivery-queue consumer (spec §4.6).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chanwatch::error::PlatformApiError;
use chanwatch::event::{Notification, Platform};
use chanwatch::sender;
use chanwatch::store::{InMemoryStore, Store};
use chanwatch::transport::Transport;
use tokio::sync::mpsc;

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

fn notification(user: &str, platform: Platform) -> Notification {
    Notification {
        user: user.to_string(),
        platform,
        channel_display: "Rust News".to_string(),
        topics_joined: "rust".to_string(),
        summary: "new release".to_string(),
        link: "https://t.me/news/1".to_string(),
    }
}

#[tokio::test]
async fn notification_is_formatted_and_routed_to_the_right_transport() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store.add_user("alice", "chat-1").await.unwrap();

    let transport = Arc::new(RecordingTransport {
        platform: Platform::Telegram,
        sent: Mutex::new(Vec::new()),
    });
    let mut transports: HashMap<Platform, Arc<dyn Transport>> = HashMap::new();
    transports.insert(Platform::Telegram, transport.clone() as Arc<dyn Transport>);

    let (tx, rx) = mpsc::channel(4);
    let handle = sender::spawn(rx, store, transports);

    tx.send(notification("alice", Platform::Telegram)).await.unwrap();
    drop(tx);
    handle.await.unwrap();

    let sent = transport.sent.lock().expect("mutex poisoned");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "chat-1");
    assert!(sent[0].1.starts_with("In application: TG"));
    assert!(sent[0].1.contains("Summary: new release"));
}

#[tokio::test]
async fn notification_for_a_platform_with_no_transport_is_dropped_silently() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store.add_user("alice", "chat-1").await.unwrap();
    let transports: HashMap<Platform, Arc<dyn Transport>> = HashMap::new();

    let (tx, rx) = mpsc::channel(4);
    let handle = sender::spawn(rx, store, transports);
    tx.send(notification("alice", Platform::Mattermost)).await.unwrap();
    drop(tx);

    // Must complete promptly rather than panicking or hanging.
    tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .expect("sender task must finish")
        .unwrap();
}
