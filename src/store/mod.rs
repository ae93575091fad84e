//! Persistent subscription/state store (spec §4.1).
//!
//! [`SqliteStore`] pairs a concurrent-read [`sqlx::SqlitePool`] with a
//! single-writer actor ([`writer`]) that serializes every mutation, the same
//! split the teacher's `MemoryEngine` uses. [`InMemoryStore`], built for
//! tests, implements the same [`Store`] trait over a
//! [`std::sync::Mutex`]-guarded map so dispatcher/sender unit tests don't
//! need a real SQLite file.

pub mod reads;
pub mod types;
pub mod writer;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::event::Platform;
use types::{DelayedMessage, UserInfo};
use writer::WriteOp;

/// The full set of operations the dispatcher, sender, and adapters need
/// from persistent state (spec §4.1). All operations return a tagged
/// [`StoreError`] on failure.
#[async_trait]
pub trait Store: Send + Sync {
    /// Idempotent insert; no-op if the tuple already exists.
    async fn add_topic(
        &self,
        user: &str,
        channel: &str,
        topic: &str,
        platform: Platform,
    ) -> Result<(), StoreError>;

    /// Delete; silent if absent.
    async fn remove_topic(
        &self,
        user: &str,
        channel: &str,
        topic: &str,
        platform: Platform,
    ) -> Result<(), StoreError>;

    /// Delete all topics of this user in this channel.
    async fn remove_channel(
        &self,
        user: &str,
        channel: &str,
        platform: Platform,
    ) -> Result<(), StoreError>;

    /// All distinct topics anyone subscribes to on this channel.
    async fn get_topics(&self, channel: &str, platform: Platform)
        -> Result<Vec<String>, StoreError>;

    /// Grouped subscription view for the `view` command.
    async fn get_user_info(&self, user: &str) -> Result<UserInfo, StoreError>;

    /// All (user, topic) pairs subscribed to `topics` on `channel` whose
    /// cooldown has elapsed.
    async fn get_users(
        &self,
        channel: &str,
        topics: &[String],
        platform: Platform,
        cooldown_secs: i64,
    ) -> Result<Vec<(String, Vec<String>)>, StoreError>;

    /// Set `last_delivery_ts := now` for this exact tuple. Returns only once
    /// the update has committed, so a `get_users` call issued immediately
    /// after observes it.
    async fn set_time(
        &self,
        user: &str,
        channel: &str,
        topic: &str,
        platform: Platform,
    ) -> Result<(), StoreError>;

    /// At least one subscription exists for this channel.
    async fn contains_channel(&self, channel: &str, platform: Platform) -> Result<bool, StoreError>;

    /// Enqueue a delayed message for a paused recipient.
    async fn add_delayed(&self, message: DelayedMessage) -> Result<(), StoreError>;

    /// Atomically read and delete all delayed messages for a user, FIFO.
    async fn drain_delayed(&self, user: &str) -> Result<Vec<DelayedMessage>, StoreError>;

    /// Pause deliveries to this user.
    async fn pause_user(&self, user: &str) -> Result<(), StoreError>;

    /// Resume deliveries to this user.
    async fn unpause_user(&self, user: &str) -> Result<(), StoreError>;

    /// Whether this user's deliveries are currently paused.
    async fn is_paused(&self, user: &str) -> Result<bool, StoreError>;

    /// Idempotent upsert of a handle ↔ transport-id mapping.
    async fn add_user(&self, handle: &str, transport_id: &str) -> Result<(), StoreError>;

    /// The transport address a handle maps to.
    async fn get_id(&self, handle: &str) -> Result<Option<String>, StoreError>;

    /// All watched VK group ids.
    async fn get_vk_groups(&self) -> Result<Vec<String>, StoreError>;

    /// A VK group's last-seen post id (0 if never polled).
    async fn get_vk_last_post(&self, group_id: &str) -> Result<i64, StoreError>;

    /// Advance a VK group's last-seen post id.
    async fn update_vk_last_post(&self, group_id: &str, last_post_id: i64) -> Result<(), StoreError>;

    /// Upsert a VK group's cached public display name.
    async fn add_vk_public(&self, display_name: &str, group_id: &str) -> Result<(), StoreError>;

    /// A VK group's cached public display name, if known.
    async fn get_vk_public_name(&self, group_id: &str) -> Result<Option<String>, StoreError>;

    /// Upsert a private channel's cached display name.
    async fn put_chan_name(
        &self,
        platform: Platform,
        channel_id: &str,
        display_name: &str,
    ) -> Result<(), StoreError>;

    /// A private channel's cached display name, if known.
    async fn get_chan_name(
        &self,
        platform: Platform,
        channel_id: &str,
    ) -> Result<Option<String>, StoreError>;
}

/// The production [`Store`]: a `sqlx::SqlitePool` for concurrent reads plus
/// a single-writer actor task for mutations.
pub struct SqliteStore {
    db: sqlx::SqlitePool,
    writer_tx: mpsc::Sender<WriteOp>,
    writer_handle: JoinHandle<()>,
}

impl SqliteStore {
    /// Connect to `connection_string`, apply the embedded schema, and spawn
    /// the writer actor.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// schema fails to apply. `StoreUnavailable` at bootstrap is fatal
    /// (spec §7).
    pub async fn connect(connection_string: &str) -> Result<Self, StoreError> {
        let options: sqlx::sqlite::SqliteConnectOptions = connection_string
            .parse::<sqlx::sqlite::SqliteConnectOptions>()?
            .create_if_missing(true);
        let db = sqlx::sqlite::SqlitePoolOptions::new()
            .connect_with(options)
            .await?;
        apply_schema(&db).await?;
        let (writer_tx, writer_rx) = mpsc::channel(256);
        let writer_handle = tokio::spawn(writer::run_writer(db.clone(), writer_rx));
        Ok(Self {
            db,
            writer_tx,
            writer_handle,
        })
    }

    /// Close the writer channel and wait for the actor to drain and stop.
    pub async fn shutdown(self) {
        drop(self.writer_tx);
        let _ = self.writer_handle.await;
    }

    async fn send(&self, op: WriteOp) -> Result<(), StoreError> {
        self.writer_tx
            .send(op)
            .await
            .map_err(|_| StoreError::WriterClosed)
    }
}

/// Apply the embedded schema. Exposed at module level so `connect` and the
/// `migrate` CLI subcommand share one code path.
pub async fn apply_schema(db: &sqlx::SqlitePool) -> Result<(), StoreError> {
    migrations::apply(db).await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn add_topic(
        &self,
        user: &str,
        channel: &str,
        topic: &str,
        platform: Platform,
    ) -> Result<(), StoreError> {
        self.send(WriteOp::AddTopic {
            user: user.to_string(),
            channel: channel.to_string(),
            topic: topic.to_string(),
            platform,
        })
        .await
    }

    async fn remove_topic(
        &self,
        user: &str,
        channel: &str,
        topic: &str,
        platform: Platform,
    ) -> Result<(), StoreError> {
        self.send(WriteOp::RemoveTopic {
            user: user.to_string(),
            channel: channel.to_string(),
            topic: topic.to_string(),
            platform,
        })
        .await
    }

    async fn remove_channel(
        &self,
        user: &str,
        channel: &str,
        platform: Platform,
    ) -> Result<(), StoreError> {
        self.send(WriteOp::RemoveChannel {
            user: user.to_string(),
            channel: channel.to_string(),
            platform,
        })
        .await
    }

    async fn get_topics(
        &self,
        channel: &str,
        platform: Platform,
    ) -> Result<Vec<String>, StoreError> {
        Ok(reads::get_topics(&self.db, channel, platform).await?)
    }

    async fn get_user_info(&self, user: &str) -> Result<UserInfo, StoreError> {
        Ok(reads::get_user_info(&self.db, user).await?)
    }

    async fn get_users(
        &self,
        channel: &str,
        topics: &[String],
        platform: Platform,
        cooldown_secs: i64,
    ) -> Result<Vec<(String, Vec<String>)>, StoreError> {
        Ok(reads::get_users(&self.db, channel, topics, platform, cooldown_secs).await?)
    }

    async fn set_time(
        &self,
        user: &str,
        channel: &str,
        topic: &str,
        platform: Platform,
    ) -> Result<(), StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(WriteOp::SetTime {
            user: user.to_string(),
            channel: channel.to_string(),
            topic: topic.to_string(),
            platform,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::WriterClosed)
    }

    async fn contains_channel(&self, channel: &str, platform: Platform) -> Result<bool, StoreError> {
        Ok(reads::contains_channel(&self.db, channel, platform).await?)
    }

    async fn add_delayed(&self, message: DelayedMessage) -> Result<(), StoreError> {
        self.send(WriteOp::AddDelayed { message }).await
    }

    async fn drain_delayed(&self, user: &str) -> Result<Vec<DelayedMessage>, StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(WriteOp::DrainDelayed {
            user: user.to_string(),
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::WriterClosed)
    }

    async fn pause_user(&self, user: &str) -> Result<(), StoreError> {
        self.send(WriteOp::PauseUser {
            user: user.to_string(),
        })
        .await
    }

    async fn unpause_user(&self, user: &str) -> Result<(), StoreError> {
        self.send(WriteOp::UnpauseUser {
            user: user.to_string(),
        })
        .await
    }

    async fn is_paused(&self, user: &str) -> Result<bool, StoreError> {
        Ok(reads::is_paused(&self.db, user).await?)
    }

    async fn add_user(&self, handle: &str, transport_id: &str) -> Result<(), StoreError> {
        self.send(WriteOp::AddUser {
            handle: handle.to_string(),
            transport_id: transport_id.to_string(),
        })
        .await
    }

    async fn get_id(&self, handle: &str) -> Result<Option<String>, StoreError> {
        Ok(reads::get_id(&self.db, handle).await?)
    }

    async fn get_vk_groups(&self) -> Result<Vec<String>, StoreError> {
        Ok(reads::get_vk_groups(&self.db).await?)
    }

    async fn get_vk_last_post(&self, group_id: &str) -> Result<i64, StoreError> {
        Ok(reads::get_vk_last_post(&self.db, group_id).await?)
    }

    async fn update_vk_last_post(&self, group_id: &str, last_post_id: i64) -> Result<(), StoreError> {
        self.send(WriteOp::UpdateVkLastPost {
            group_id: group_id.to_string(),
            last_post_id,
        })
        .await
    }

    async fn add_vk_public(&self, display_name: &str, group_id: &str) -> Result<(), StoreError> {
        self.send(WriteOp::AddVkPublic {
            display_name: display_name.to_string(),
            group_id: group_id.to_string(),
        })
        .await
    }

    async fn get_vk_public_name(&self, group_id: &str) -> Result<Option<String>, StoreError> {
        Ok(reads::get_vk_public_name(&self.db, group_id).await?)
    }

    async fn put_chan_name(
        &self,
        platform: Platform,
        channel_id: &str,
        display_name: &str,
    ) -> Result<(), StoreError> {
        self.send(WriteOp::PutChanName {
            platform,
            channel_id: channel_id.to_string(),
            display_name: display_name.to_string(),
        })
        .await
    }

    async fn get_chan_name(
        &self,
        platform: Platform,
        channel_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(reads::get_chan_name(&self.db, platform, channel_id).await?)
    }
}

pub mod migrations;

pub mod in_memory;
pub use in_memory::InMemoryStore;
