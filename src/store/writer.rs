//! Single-writer actor for Store mutations.
//!
//! Mirrors the teacher's `memory::writer`: one task owns the only writable
//! handle onto SQLite and serializes every mutation through it, so
//! concurrent adapters/workers never contend on write locks. Reads bypass
//! this actor entirely and go straight through the pool (see
//! `store::reads`).

use tokio::sync::{mpsc, oneshot};
use tracing::{error, trace};

use crate::event::Platform;
use crate::store::types::DelayedMessage;

/// A serialized mutation request. Operations with a return value carry a
/// `oneshot::Sender` reply channel; fire-and-forget operations do not.
pub enum WriteOp {
    /// Idempotent subscribe.
    AddTopic {
        /// Subscriber handle.
        user: String,
        /// Channel identifier.
        channel: String,
        /// Topic substring.
        topic: String,
        /// Source platform.
        platform: Platform,
    },
    /// Unsubscribe; silent if the row is absent.
    RemoveTopic {
        /// Subscriber handle.
        user: String,
        /// Channel identifier.
        channel: String,
        /// Topic substring.
        topic: String,
        /// Source platform.
        platform: Platform,
    },
    /// Delete every topic the user subscribes to on this channel.
    RemoveChannel {
        /// Subscriber handle.
        user: String,
        /// Channel identifier.
        channel: String,
        /// Source platform.
        platform: Platform,
    },
    /// Set `last_delivery_ts` to now for one (user, channel, topic,
    /// platform) tuple. Carries a reply so callers can await the commit
    /// rather than just the enqueue — a same-channel `get_users` read that
    /// runs via the pool right after this returns must see the stamp (spec
    /// §8 invariant: at most one notification per cooldown interval).
    SetTime {
        /// Subscriber handle.
        user: String,
        /// Channel identifier.
        channel: String,
        /// Topic substring.
        topic: String,
        /// Source platform.
        platform: Platform,
        /// Reply channel signaled once the update has committed.
        reply: oneshot::Sender<()>,
    },
    /// Append a delayed message for a paused recipient.
    AddDelayed {
        /// The message to enqueue.
        message: DelayedMessage,
    },
    /// Atomically read and delete all delayed messages for a user, in FIFO
    /// insertion order.
    DrainDelayed {
        /// The recipient whose queue is drained.
        user: String,
        /// Reply channel carrying the drained messages.
        reply: oneshot::Sender<Vec<DelayedMessage>>,
    },
    /// Set the pause flag for a user.
    PauseUser {
        /// The user's handle.
        user: String,
    },
    /// Clear the pause flag for a user.
    UnpauseUser {
        /// The user's handle.
        user: String,
    },
    /// Idempotent upsert of a user's handle/transport-id mapping.
    AddUser {
        /// The user's handle.
        handle: String,
        /// The transport address (e.g. a chat id) for this handle.
        transport_id: String,
    },
    /// Advance a VK group's last-seen post id.
    UpdateVkLastPost {
        /// VK group id.
        group_id: String,
        /// New last-seen post id.
        last_post_id: i64,
    },
    /// Upsert a VK group's cached public display name.
    AddVkPublic {
        /// The group's public display name.
        display_name: String,
        /// VK group id.
        group_id: String,
    },
    /// Upsert a private channel's cached display name (Telegram/Mattermost).
    PutChanName {
        /// Source platform.
        platform: Platform,
        /// Channel identifier.
        channel_id: String,
        /// Display name to cache.
        display_name: String,
    },
}

/// Runs until `rx` is closed (all `Store` clones have been dropped), then
/// returns.
pub async fn run_writer(db: sqlx::SqlitePool, mut rx: mpsc::Receiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        if let Err(err) = handle_op(&db, op).await {
            error!(error = %err, "store write failed");
        }
    }
    trace!("store writer stopped");
}

async fn handle_op(db: &sqlx::SqlitePool, op: WriteOp) -> Result<(), sqlx::Error> {
    match op {
        WriteOp::AddTopic {
            user,
            channel,
            topic,
            platform,
        } => {
            sqlx::query(
                "INSERT INTO subscriptions (handle, channel_id, topic, platform, last_delivery_ts) \
                 VALUES (?, ?, ?, ?, NULL) \
                 ON CONFLICT (handle, channel_id, topic, platform) DO NOTHING",
            )
            .bind(&user)
            .bind(&channel)
            .bind(&topic)
            .bind(platform.as_str())
            .execute(db)
            .await?;
            trace!(%user, %channel, %topic, %platform, "topic added");
        }
        WriteOp::RemoveTopic {
            user,
            channel,
            topic,
            platform,
        } => {
            sqlx::query(
                "DELETE FROM subscriptions \
                 WHERE handle = ? AND channel_id = ? AND topic = ? AND platform = ?",
            )
            .bind(&user)
            .bind(&channel)
            .bind(&topic)
            .bind(platform.as_str())
            .execute(db)
            .await?;
            trace!(%user, %channel, %topic, %platform, "topic removed");
        }
        WriteOp::RemoveChannel {
            user,
            channel,
            platform,
        } => {
            sqlx::query(
                "DELETE FROM subscriptions WHERE handle = ? AND channel_id = ? AND platform = ?",
            )
            .bind(&user)
            .bind(&channel)
            .bind(platform.as_str())
            .execute(db)
            .await?;
            trace!(%user, %channel, %platform, "channel subscriptions removed");
        }
        WriteOp::SetTime {
            user,
            channel,
            topic,
            platform,
            reply,
        } => {
            sqlx::query(
                "UPDATE subscriptions SET last_delivery_ts = strftime('%s','now') \
                 WHERE handle = ? AND channel_id = ? AND topic = ? AND platform = ?",
            )
            .bind(&user)
            .bind(&channel)
            .bind(&topic)
            .bind(platform.as_str())
            .execute(db)
            .await?;
            trace!(%user, %channel, %topic, %platform, "delivery time updated");
            // Same reasoning as `DrainDelayed`: a dropped receiver (e.g. a
            // caller that gave up) leaves nothing to recover from.
            let _ = reply.send(());
        }
        WriteOp::AddDelayed { message } => {
            sqlx::query(
                "INSERT INTO delayed (handle, platform, channel_display, topic, summary, link) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&message.user)
            .bind(message.platform.as_str())
            .bind(&message.channel_display)
            .bind(&message.topic)
            .bind(&message.summary)
            .bind(&message.link)
            .execute(db)
            .await?;
            trace!(user = %message.user, "delayed message queued");
        }
        WriteOp::DrainDelayed { user, reply } => {
            let rows: Vec<(String, String, String, String, String, String)> = sqlx::query_as(
                "SELECT handle, platform, channel_display, topic, summary, link \
                 FROM delayed WHERE handle = ? ORDER BY id ASC",
            )
            .bind(&user)
            .fetch_all(db)
            .await?;
            sqlx::query("DELETE FROM delayed WHERE handle = ?")
                .bind(&user)
                .execute(db)
                .await?;
            let messages = rows
                .into_iter()
                .filter_map(|(handle, platform, channel_display, topic, summary, link)| {
                    Platform::parse(&platform).map(|platform| DelayedMessage {
                        user: handle,
                        platform,
                        channel_display,
                        topic,
                        summary,
                        link,
                    })
                })
                .collect();
            trace!(%user, "delayed messages drained");
            // The worker loop keeps running even if the caller dropped the
            // reply receiver (e.g. it timed out); nothing to recover from.
            let _ = reply.send(messages);
        }
        WriteOp::PauseUser { user } => {
            sqlx::query("UPDATE users SET paused = 1 WHERE handle = ?")
                .bind(&user)
                .execute(db)
                .await?;
            trace!(%user, "user paused");
        }
        WriteOp::UnpauseUser { user } => {
            sqlx::query("UPDATE users SET paused = 0 WHERE handle = ?")
                .bind(&user)
                .execute(db)
                .await?;
            trace!(%user, "user unpaused");
        }
        WriteOp::AddUser { handle, transport_id } => {
            sqlx::query(
                "INSERT INTO users (handle, transport_id, paused) VALUES (?, ?, 0) \
                 ON CONFLICT (handle) DO UPDATE SET transport_id = excluded.transport_id",
            )
            .bind(&handle)
            .bind(&transport_id)
            .execute(db)
            .await?;
            trace!(%handle, "user registered");
        }
        WriteOp::UpdateVkLastPost {
            group_id,
            last_post_id,
        } => {
            sqlx::query(
                "INSERT INTO vk_cursor (group_id, last_post_id, public_name) VALUES (?, ?, NULL) \
                 ON CONFLICT (group_id) DO UPDATE SET last_post_id = excluded.last_post_id",
            )
            .bind(&group_id)
            .bind(last_post_id)
            .execute(db)
            .await?;
            trace!(%group_id, last_post_id, "vk cursor advanced");
        }
        WriteOp::AddVkPublic {
            display_name,
            group_id,
        } => {
            sqlx::query(
                "INSERT INTO vk_cursor (group_id, last_post_id, public_name) VALUES (?, 0, ?) \
                 ON CONFLICT (group_id) DO UPDATE SET public_name = excluded.public_name",
            )
            .bind(&group_id)
            .bind(&display_name)
            .execute(db)
            .await?;
            trace!(%group_id, %display_name, "vk public name cached");
        }
        WriteOp::PutChanName {
            platform,
            channel_id,
            display_name,
        } => {
            sqlx::query(
                "INSERT INTO channel_name_cache (platform, channel_id, display_name) \
                 VALUES (?, ?, ?) \
                 ON CONFLICT (platform, channel_id) DO UPDATE SET display_name = excluded.display_name",
            )
            .bind(platform.as_str())
            .bind(&channel_id)
            .bind(&display_name)
            .execute(db)
            .await?;
            trace!(%channel_id, %platform, %display_name, "channel name cached");
        }
    }
    Ok(())
}
