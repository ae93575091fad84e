//! Black-box coverage of the dispatcher worker pool's sharding and
//! error-propagation behavior (spec §4.2, §7).

use std::sync::Arc;
use std::time::Duration;

use chanwatch::dispatcher::{Dispatcher, DispatcherConfig};
use chanwatch::event::{shard_of, Event, Platform};
use chanwatch::matcher::MatcherClient;
use chanwatch::store::{InMemoryStore, Store};
use tokio::sync::mpsc;

fn unreachable_matcher() -> Arc<MatcherClient> {
    // Port 0 is never a live listener; every call fails fast with a
    // transport error, which the matcher error policy maps to DropEvent.
    Arc::new(MatcherClient::new("http://127.0.0.1:0", Duration::from_millis(200)))
}

#[tokio::test]
async fn event_on_unwatched_channel_produces_no_notification() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let (delivery_tx, mut delivery_rx) = mpsc::channel(16);
    let dispatcher = Dispatcher::spawn(DispatcherConfig {
        n_work: 4,
        queue_capacity: 16,
        store,
        matcher: unreachable_matcher(),
        summarizer: None,
        summary_len: 50,
        cooldown_secs: 60,
        delivery_tx,
    });

    dispatcher
        .enqueue(Event::new(Platform::Telegram, "news", "unwatched", "hi", "https://t.me/news/1", "1"))
        .await
        .unwrap();
    dispatcher.shutdown().await;

    assert!(delivery_rx.try_recv().is_err());
}

#[tokio::test]
async fn matcher_transport_failure_drops_the_event() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store.add_topic("alice", "news", "rust", Platform::Telegram).await.unwrap();

    let (delivery_tx, mut delivery_rx) = mpsc::channel(16);
    let dispatcher = Dispatcher::spawn(DispatcherConfig {
        n_work: 2,
        queue_capacity: 16,
        store,
        matcher: unreachable_matcher(),
        summarizer: None,
        summary_len: 50,
        cooldown_secs: 60,
        delivery_tx,
    });

    dispatcher
        .enqueue(Event::new(
            Platform::Telegram,
            "News",
            "news",
            "new rust release",
            "https://t.me/news/1",
            "1",
        ))
        .await
        .unwrap();
    dispatcher.shutdown().await;

    assert!(delivery_rx.try_recv().is_err(), "matcher failure must drop the event, not panic or hang");
}

#[tokio::test]
async fn shutdown_drains_a_full_queue_without_hanging() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let (delivery_tx, mut delivery_rx) = mpsc::channel(16);
    let dispatcher = Dispatcher::spawn(DispatcherConfig {
        n_work: 4,
        queue_capacity: 16,
        store,
        matcher: unreachable_matcher(),
        summarizer: None,
        summary_len: 50,
        cooldown_secs: 60,
        delivery_tx,
    });

    for i in 0..20 {
        dispatcher
            .enqueue(Event::new(
                Platform::Telegram,
                "news",
                format!("channel-{i}"),
                "hi",
                "https://t.me/news/1",
                "1",
            ))
            .await
            .unwrap();
    }

    tokio::time::timeout(Duration::from_secs(5), dispatcher.shutdown())
        .await
        .expect("shutdown must not hang even with every shard still draining");
    assert!(delivery_rx.try_recv().is_err());
}

#[test]
fn shard_assignment_is_stable_for_repeated_channels() {
    let shard_count = 30;
    assert_eq!(shard_of("same-channel", shard_count), shard_of("same-channel", shard_count));
}
