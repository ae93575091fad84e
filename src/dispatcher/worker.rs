//! The per-event dispatcher algorithm (spec §4.2 "Worker algorithm").

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{classify_matcher_error, classify_store_error, ErrorDisposition};
use crate::event::{Event, Notification};
use crate::matcher::MatcherClient;
use crate::store::types::DelayedMessage;
use crate::store::Store;
use crate::summarizer::{summarize_or_truncate, SummarizerClient};

/// Everything a worker needs that does not change per event.
pub struct WorkerContext {
    /// Shared persistent state.
    pub store: Arc<dyn Store>,
    /// Topic-matcher HTTP collaborator.
    pub matcher: Arc<MatcherClient>,
    /// Optional summarizer HTTP collaborator; `None` disables it (spec §6).
    pub summarizer: Option<Arc<SummarizerClient>>,
    /// Unicode-scalar length of the truncation-fallback summary.
    pub summary_len: usize,
    /// Per-subscription cooldown, in seconds.
    pub cooldown_secs: i64,
    /// Where finished notifications are handed to the sender.
    pub delivery_tx: mpsc::Sender<Notification>,
}

/// Runs one dispatcher worker's loop: pops events off `rx` until the
/// channel is closed and drained (spec §5 shutdown: "workers drain their
/// queues").
pub async fn run_worker(worker_id: usize, ctx: WorkerContext, mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        process_event(worker_id, &ctx, event).await;
    }
    debug!(worker_id, "dispatcher worker drained and stopped");
}

/// Process a single event through the match → summarize →
/// recipient-lookup → delivery-decision pipeline. Never panics or
/// propagates an error past this call: per spec §7, errors are logged and
/// swallowed at the event boundary.
async fn process_event(worker_id: usize, ctx: &WorkerContext, event: Event) {
    let channel_id = event.channel_id.clone();
    let platform = event.platform;

    // Step 1: channel must have at least one subscription.
    let contains = match ctx.store.contains_channel(&channel_id, platform).await {
        Ok(contains) => contains,
        Err(err) => {
            if classify_store_error(&err) == ErrorDisposition::DropEvent {
                warn!(worker_id, %channel_id, %platform, error = %err, "dropping event: store error on contains_channel");
            }
            return;
        }
    };
    if !contains {
        debug!(worker_id, %channel_id, %platform, "no subscriptions for channel, discarding");
        return;
    }

    // Step 2: candidate topics.
    let candidates = match ctx.store.get_topics(&channel_id, platform).await {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(worker_id, %channel_id, %platform, error = %err, "dropping event: store error on get_topics");
            return;
        }
    };
    if candidates.is_empty() {
        debug!(worker_id, %channel_id, %platform, "no candidate topics, discarding");
        return;
    }

    // Step 3: match. Never called with an empty candidate list (spec §8).
    let matched = match ctx.matcher.analyze(&event.text, &candidates).await {
        Ok(matched) => matched,
        Err(err) => {
            if classify_matcher_error(&err) == ErrorDisposition::DropEvent {
                warn!(worker_id, %channel_id, %platform, error = %err, "dropping event: matcher error");
            }
            return;
        }
    };
    if matched.is_empty() {
        debug!(worker_id, %channel_id, %platform, "no matched topics, discarding");
        return;
    }
    let topics_joined = dedup_join(&matched);

    // Step 4: summarize. Never called when there is no match (already
    // short-circuited above).
    let summary = summarize_or_truncate(
        ctx.summarizer.as_deref(),
        &event.text,
        ctx.summary_len,
    )
    .await;

    // Step 5/6/7: recipients and delivery decision.
    if let Some(history) = &event.history_request {
        deliver_history_notification(worker_id, ctx, &event, &history.user, &topics_joined, &summary)
            .await;
        return;
    }

    let recipients = match ctx
        .store
        .get_users(&channel_id, &matched, platform, ctx.cooldown_secs)
        .await
    {
        Ok(recipients) => recipients,
        Err(err) => {
            warn!(worker_id, %channel_id, %platform, error = %err, "dropping event: store error on get_users");
            return;
        }
    };

    for (user, topics) in recipients {
        deliver_to_recipient(worker_id, ctx, &event, &user, &topics, &summary).await;
    }
}

/// Steps 6 for one (user, topics) pair on the non-history path: resolve
/// display name, stamp cooldown, then either enqueue or delay.
async fn deliver_to_recipient(
    worker_id: usize,
    ctx: &WorkerContext,
    event: &Event,
    user: &str,
    topics: &[String],
    summary: &str,
) {
    let display_name = resolve_display_name(ctx, event).await;

    for topic in topics {
        if let Err(err) = ctx
            .store
            .set_time(user, &event.channel_id, topic, event.platform)
            .await
        {
            warn!(worker_id, %user, %topic, error = %err, "failed to stamp delivery time, continuing anyway");
        }
    }

    let notification = Notification {
        user: user.to_string(),
        platform: event.platform,
        channel_display: display_name,
        topics_joined: dedup_join(topics),
        summary: summary.to_string(),
        link: event.link.clone(),
    };

    let paused = match ctx.store.is_paused(user).await {
        Ok(paused) => paused,
        Err(err) => {
            warn!(worker_id, %user, error = %err, "dropping notification: store error on is_paused");
            return;
        }
    };

    if paused {
        let delayed = DelayedMessage {
            user: notification.user,
            platform: notification.platform,
            channel_display: notification.channel_display,
            topic: notification.topics_joined,
            summary: notification.summary,
            link: notification.link,
        };
        if let Err(err) = ctx.store.add_delayed(delayed).await {
            error!(worker_id, %user, error = %err, "failed to queue delayed message");
        }
    } else if ctx.delivery_tx.send(notification).await.is_err() {
        error!(worker_id, %user, "delivery queue closed, dropping notification");
    }
}

/// Step 7: history-request path. Bypasses cooldown and pause entirely, and
/// does not touch `last_delivery_ts` (spec §4.2 step 5, §8 scenario 6).
async fn deliver_history_notification(
    worker_id: usize,
    ctx: &WorkerContext,
    event: &Event,
    user: &str,
    topics_joined: &str,
    summary: &str,
) {
    let display_name = resolve_display_name(ctx, event).await;
    let notification = Notification {
        user: user.to_string(),
        platform: event.platform,
        channel_display: display_name,
        topics_joined: topics_joined.to_string(),
        summary: summary.to_string(),
        link: event.link.clone(),
    };
    if ctx.delivery_tx.send(notification).await.is_err() {
        error!(worker_id, %user, "delivery queue closed, dropping history notification");
    }
}

/// Resolve a private channel's cached display name, falling back to the
/// event's own `channel` field (already the display name for public
/// Telegram chats and resolved VK group names).
async fn resolve_display_name(ctx: &WorkerContext, event: &Event) -> String {
    match ctx
        .store
        .get_chan_name(event.platform, &event.channel_id)
        .await
    {
        Ok(Some(name)) => name,
        _ => event.channel.clone(),
    }
}

/// Comma-join topics, de-duplicating (spec §8 boundary behavior: "matcher
/// returning duplicate topics ⇒ de-duplicated when joined").
fn dedup_join(topics: &[String]) -> String {
    let mut seen = Vec::new();
    for topic in topics {
        if !seen.contains(topic) {
            seen.push(topic.clone());
        }
    }
    seen.join(", ")
}
