//! Sharded dispatcher worker pool (spec §2, §4.2).
//!
//! `N_WORK` identical worker loops, each consuming its own bounded event
//! queue. A single stable hash of the channel identifier
//! (`event::shard_of`) routes every event for a given channel to the same
//! worker, giving per-channel FIFO without cross-worker locking — the
//! invariant spec §9 calls out as the one thing to preserve when
//! generalizing this pool's shape.

pub mod worker;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::event::{shard_of, Event, Notification};
use crate::matcher::MatcherClient;
use crate::store::Store;
use crate::summarizer::SummarizerClient;
use worker::WorkerContext;

/// A running dispatcher worker pool plus the producer-side handle adapters
/// enqueue events through.
pub struct Dispatcher {
    shard_txs: Vec<mpsc::Sender<Event>>,
    worker_handles: Vec<JoinHandle<()>>,
}

/// Construction parameters for [`Dispatcher::spawn`].
pub struct DispatcherConfig {
    /// Number of worker loops / shard queues (`N_WORK`, default 30).
    pub n_work: usize,
    /// Bounded capacity of each shard queue.
    pub queue_capacity: usize,
    /// Shared persistent state.
    pub store: Arc<dyn Store>,
    /// Topic-matcher HTTP collaborator.
    pub matcher: Arc<MatcherClient>,
    /// Optional summarizer HTTP collaborator.
    pub summarizer: Option<Arc<SummarizerClient>>,
    /// Unicode-scalar length of the truncation-fallback summary.
    pub summary_len: usize,
    /// Per-subscription cooldown, in seconds.
    pub cooldown_secs: i64,
    /// Where finished notifications are handed to the sender.
    pub delivery_tx: mpsc::Sender<Notification>,
}

impl Dispatcher {
    /// Spawn `n_work` worker tasks, each with its own shard queue.
    pub fn spawn(config: DispatcherConfig) -> Self {
        let mut shard_txs = Vec::with_capacity(config.n_work);
        let mut worker_handles = Vec::with_capacity(config.n_work);

        for worker_id in 0..config.n_work {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            shard_txs.push(tx);
            let ctx = WorkerContext {
                store: Arc::clone(&config.store),
                matcher: Arc::clone(&config.matcher),
                summarizer: config.summarizer.clone(),
                summary_len: config.summary_len,
                cooldown_secs: config.cooldown_secs,
                delivery_tx: config.delivery_tx.clone(),
            };
            worker_handles.push(tokio::spawn(worker::run_worker(worker_id, ctx, rx)));
        }

        info!(n_work = config.n_work, "dispatcher worker pool started");
        Self {
            shard_txs,
            worker_handles,
        }
    }

    /// Route `event` to `work_q[h(channel_id) mod N_WORK]` (spec §4.2
    /// "Sharding producer").
    ///
    /// Returns `Err(event)` if that shard's queue has been closed (e.g.
    /// during shutdown), handing the event back to the caller rather than
    /// silently dropping it.
    pub async fn enqueue(&self, event: Event) -> Result<(), Event> {
        let shard = shard_of(&event.channel_id, self.shard_txs.len());
        self.shard_txs[shard].send(event).await.map_err(|e| e.0)
    }

    /// Close every shard queue's producer side and wait for each worker to
    /// drain and stop (spec §5 shutdown order: "adapters stop accepting new
    /// events, workers drain their queues").
    pub async fn shutdown(self) {
        drop(self.shard_txs);
        for handle in self.worker_handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn test_config(
        store: Arc<dyn Store>,
        delivery_tx: mpsc::Sender<Notification>,
    ) -> DispatcherConfig {
        DispatcherConfig {
            n_work: 4,
            queue_capacity: 16,
            store,
            matcher: Arc::new(MatcherClient::new(
                "http://127.0.0.1:0",
                Duration::from_secs(1),
            )),
            summarizer: None,
            summary_len: 50,
            cooldown_secs: 60,
            delivery_tx,
        }
    }

    #[tokio::test]
    async fn discards_event_for_unsubscribed_channel() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let (delivery_tx, mut delivery_rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::spawn(test_config(store, delivery_tx));

        dispatcher
            .enqueue(crate::event::Event::new(
                crate::event::Platform::Telegram,
                "news",
                "unwatched",
                "hello",
                "https://t.me/news/1",
                "1",
            ))
            .await
            .unwrap();

        dispatcher.shutdown().await;
        assert!(delivery_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn same_channel_routes_to_same_shard() {
        let n = 30;
        let a = crate::event::shard_of("channel-xyz", n);
        let b = crate::event::shard_of("channel-xyz", n);
        assert_eq!(a, b);
    }
}
