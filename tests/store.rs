//! Black-box coverage of the [`Store`] contract against its in-memory
//! implementation (spec §4.1).

use chanwatch::event::Platform;
use chanwatch::store::types::DelayedMessage;
use chanwatch::store::{InMemoryStore, Store};

#[tokio::test]
async fn subscription_lifecycle() {
    let store = InMemoryStore::new();
    assert!(!store.contains_channel("news", Platform::Telegram).await.unwrap());

    store.add_topic("alice", "news", "rust", Platform::Telegram).await.unwrap();
    store.add_topic("bob", "news", "wasm", Platform::Telegram).await.unwrap();
    assert!(store.contains_channel("news", Platform::Telegram).await.unwrap());

    let mut topics = store.get_topics("news", Platform::Telegram).await.unwrap();
    topics.sort();
    assert_eq!(topics, vec!["rust".to_string(), "wasm".to_string()]);

    store.remove_topic("alice", "news", "rust", Platform::Telegram).await.unwrap();
    let topics = store.get_topics("news", Platform::Telegram).await.unwrap();
    assert_eq!(topics, vec!["wasm".to_string()]);

    store.remove_channel("bob", "news", Platform::Telegram).await.unwrap();
    assert!(!store.contains_channel("news", Platform::Telegram).await.unwrap());
}

#[tokio::test]
async fn cooldown_gates_repeat_delivery() {
    let store = InMemoryStore::new();
    store.add_topic("alice", "news", "rust", Platform::Telegram).await.unwrap();

    let recipients = store
        .get_users("news", &["rust".to_string()], Platform::Telegram, 60)
        .await
        .unwrap();
    assert_eq!(recipients.len(), 1);
    assert_eq!(recipients[0].0, "alice");

    store.set_time("alice", "news", "rust", Platform::Telegram).await.unwrap();
    let recipients = store
        .get_users("news", &["rust".to_string()], Platform::Telegram, 60)
        .await
        .unwrap();
    assert!(recipients.is_empty(), "cooldown should suppress the just-delivered subscription");
}

#[tokio::test]
async fn pause_and_replay_preserves_fifo_order() {
    let store = InMemoryStore::new();
    store.pause_user("alice").await.unwrap();
    assert!(store.is_paused("alice").await.unwrap());

    for i in 0..3 {
        store
            .add_delayed(DelayedMessage {
                user: "alice".to_string(),
                platform: Platform::Telegram,
                channel_display: "News".to_string(),
                topic: "rust".to_string(),
                summary: format!("post {i}"),
                link: format!("https://t.me/news/{i}"),
            })
            .await
            .unwrap();
    }

    store.unpause_user("alice").await.unwrap();
    assert!(!store.is_paused("alice").await.unwrap());

    let drained = store.drain_delayed("alice").await.unwrap();
    let summaries: Vec<_> = drained.iter().map(|m| m.summary.clone()).collect();
    assert_eq!(summaries, vec!["post 0".to_string(), "post 1".to_string(), "post 2".to_string()]);
    assert!(store.drain_delayed("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn private_channel_name_cache_round_trips() {
    let store = InMemoryStore::new();
    assert_eq!(store.get_chan_name(Platform::Telegram, "1234").await.unwrap(), None);
    store.put_chan_name(Platform::Telegram, "1234", "Secret Channel").await.unwrap();
    assert_eq!(
        store.get_chan_name(Platform::Telegram, "1234").await.unwrap(),
        Some("Secret Channel".to_string())
    );
}

#[tokio::test]
async fn vk_cursor_and_public_name_round_trip() {
    let store = InMemoryStore::new();
    assert_eq!(store.get_vk_last_post("42").await.unwrap(), 0);
    store.update_vk_last_post("42", 100).await.unwrap();
    assert_eq!(store.get_vk_last_post("42").await.unwrap(), 100);

    store.add_vk_public("Rust News", "42").await.unwrap();
    assert_eq!(store.get_vk_public_name("42").await.unwrap(), Some("Rust News".to_string()));
    assert!(store.get_vk_groups().await.unwrap().contains(&"42".to_string()));
}

#[tokio::test]
async fn user_transport_id_round_trips() {
    let store = InMemoryStore::new();
    assert_eq!(store.get_id("alice").await.unwrap(), None);
    store.add_user("alice", "12345").await.unwrap();
    assert_eq!(store.get_id("alice").await.unwrap(), Some("12345".to_string()));
}
