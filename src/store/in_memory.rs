//! An in-process [`super::Store`] backed by a single [`std::sync::Mutex`],
//! used by unit and integration tests so they don't need a real SQLite
//! file.
//!
//! Locking is always scoped (`let guard = state.lock().unwrap(); ...` with
//! the guard dropping at end of block) — never an explicit lock-then-
//! immediately-unlock pair, the bug spec §9 calls out in the source this
//! crate was reimplemented from.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{DelayedMessage, UserInfo};
use super::Store;
use crate::error::StoreError;
use crate::event::Platform;

#[derive(Default)]
struct State {
    subscriptions: HashMap<(String, String, String, Platform), Option<i64>>,
    users: HashMap<String, (String, bool)>,
    delayed: HashMap<String, Vec<DelayedMessage>>,
    vk_last_post: HashMap<String, i64>,
    vk_public_name: HashMap<String, String>,
    chan_name: HashMap<(Platform, String), String>,
}

/// In-memory [`Store`] for tests. Not used in production.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current unix-epoch seconds, for cooldown comparisons.
    fn now() -> i64 {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs();
        i64::try_from(secs).expect("unix timestamp fits in i64 until year 292277026596")
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn add_topic(
        &self,
        user: &str,
        channel: &str,
        topic: &str,
        platform: Platform,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state
            .subscriptions
            .entry((user.to_string(), channel.to_string(), topic.to_string(), platform))
            .or_insert(None);
        Ok(())
    }

    async fn remove_topic(
        &self,
        user: &str,
        channel: &str,
        topic: &str,
        platform: Platform,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state
            .subscriptions
            .remove(&(user.to_string(), channel.to_string(), topic.to_string(), platform));
        Ok(())
    }

    async fn remove_channel(
        &self,
        user: &str,
        channel: &str,
        platform: Platform,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state
            .subscriptions
            .retain(|(u, c, _, p), _| !(u == user && c == channel && *p == platform));
        Ok(())
    }

    async fn get_topics(
        &self,
        channel: &str,
        platform: Platform,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        let mut topics: Vec<String> = state
            .subscriptions
            .keys()
            .filter(|(_, c, _, p)| c == channel && *p == platform)
            .map(|(_, _, t, _)| t.clone())
            .collect();
        topics.sort();
        topics.dedup();
        Ok(topics)
    }

    async fn get_user_info(&self, user: &str) -> Result<UserInfo, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        let mut grouped: Vec<(Platform, Vec<(String, Vec<String>)>)> = Vec::new();
        let mut keys: Vec<_> = state
            .subscriptions
            .keys()
            .filter(|(u, ..)| u == user)
            .collect();
        keys.sort_by(|a, b| (a.3.as_str(), &a.1, &a.2).cmp(&(b.3.as_str(), &b.1, &b.2)));
        for (_, channel, topic, platform) in keys {
            let display_name = if *platform == Platform::Vk {
                state
                    .vk_public_name
                    .get(channel)
                    .cloned()
                    .unwrap_or_else(|| channel.clone())
            } else {
                state
                    .chan_name
                    .get(&(*platform, channel.clone()))
                    .cloned()
                    .unwrap_or_else(|| channel.clone())
            };
            let bucket_idx = match grouped.iter().position(|(p, _)| p == platform) {
                Some(idx) => idx,
                None => {
                    let idx = grouped.len();
                    grouped.push((*platform, Vec::new()));
                    idx
                }
            };
            let bucket = &mut grouped[bucket_idx].1;
            match bucket.iter_mut().find(|(name, _)| *name == display_name) {
                Some((_, topics)) => topics.push(topic.clone()),
                None => bucket.push((display_name, vec![topic.clone()])),
            }
        }
        Ok(grouped)
    }

    async fn get_users(
        &self,
        channel: &str,
        topics: &[String],
        platform: Platform,
        cooldown_secs: i64,
    ) -> Result<Vec<(String, Vec<String>)>, StoreError> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.lock().expect("store mutex poisoned");
        let now = Self::now();
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for ((user, c, topic, p), last_ts) in state.subscriptions.iter() {
            if c != channel || *p != platform || !topics.contains(topic) {
                continue;
            }
            let eligible = match last_ts {
                None => true,
                Some(ts) => now - ts >= cooldown_secs,
            };
            if !eligible {
                continue;
            }
            match grouped.iter_mut().find(|(u, _)| u == user) {
                Some((_, ts)) => ts.push(topic.clone()),
                None => grouped.push((user.clone(), vec![topic.clone()])),
            }
        }
        Ok(grouped)
    }

    async fn set_time(
        &self,
        user: &str,
        channel: &str,
        topic: &str,
        platform: Platform,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if let Some(ts) = state.subscriptions.get_mut(&(
            user.to_string(),
            channel.to_string(),
            topic.to_string(),
            platform,
        )) {
            *ts = Some(Self::now());
        }
        Ok(())
    }

    async fn contains_channel(&self, channel: &str, platform: Platform) -> Result<bool, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .subscriptions
            .keys()
            .any(|(_, c, _, p)| c == channel && *p == platform))
    }

    async fn add_delayed(&self, message: DelayedMessage) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state
            .delayed
            .entry(message.user.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn drain_delayed(&self, user: &str) -> Result<Vec<DelayedMessage>, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        Ok(state.delayed.remove(user).unwrap_or_default())
    }

    async fn pause_user(&self, user: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state
            .users
            .entry(user.to_string())
            .or_insert_with(|| (String::new(), false))
            .1 = true;
        Ok(())
    }

    async fn unpause_user(&self, user: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state
            .users
            .entry(user.to_string())
            .or_insert_with(|| (String::new(), false))
            .1 = false;
        Ok(())
    }

    async fn is_paused(&self, user: &str) -> Result<bool, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.users.get(user).map(|(_, paused)| *paused).unwrap_or(false))
    }

    async fn add_user(&self, handle: &str, transport_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let entry = state
            .users
            .entry(handle.to_string())
            .or_insert_with(|| (transport_id.to_string(), false));
        entry.0 = transport_id.to_string();
        Ok(())
    }

    async fn get_id(&self, handle: &str) -> Result<Option<String>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.users.get(handle).map(|(id, _)| id.clone()))
    }

    async fn get_vk_groups(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.vk_last_post.keys().cloned().collect())
    }

    async fn get_vk_last_post(&self, group_id: &str) -> Result<i64, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.vk_last_post.get(group_id).copied().unwrap_or(0))
    }

    async fn update_vk_last_post(&self, group_id: &str, last_post_id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.vk_last_post.insert(group_id.to_string(), last_post_id);
        Ok(())
    }

    async fn add_vk_public(&self, display_name: &str, group_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state
            .vk_public_name
            .insert(group_id.to_string(), display_name.to_string());
        state.vk_last_post.entry(group_id.to_string()).or_insert(0);
        Ok(())
    }

    async fn get_vk_public_name(&self, group_id: &str) -> Result<Option<String>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.vk_public_name.get(group_id).cloned())
    }

    async fn put_chan_name(
        &self,
        platform: Platform,
        channel_id: &str,
        display_name: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state
            .chan_name
            .insert((platform, channel_id.to_string()), display_name.to_string());
        Ok(())
    }

    async fn get_chan_name(
        &self,
        platform: Platform,
        channel_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.chan_name.get(&(platform, channel_id.to_string())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_remove_topic_restores_contains_channel() {
        let store = InMemoryStore::new();
        assert!(!store.contains_channel("c", Platform::Telegram).await.unwrap());
        store
            .add_topic("alice", "c", "rust", Platform::Telegram)
            .await
            .unwrap();
        assert!(store.contains_channel("c", Platform::Telegram).await.unwrap());
        store
            .remove_topic("alice", "c", "rust", Platform::Telegram)
            .await
            .unwrap();
        assert!(!store.contains_channel("c", Platform::Telegram).await.unwrap());
    }

    #[tokio::test]
    async fn add_topic_is_idempotent() {
        let store = InMemoryStore::new();
        store
            .add_topic("alice", "c", "rust", Platform::Telegram)
            .await
            .unwrap();
        store
            .add_topic("alice", "c", "rust", Platform::Telegram)
            .await
            .unwrap();
        assert_eq!(
            store.get_topics("c", Platform::Telegram).await.unwrap(),
            vec!["rust".to_string()]
        );
    }

    #[tokio::test]
    async fn cooldown_excludes_recent_delivery() {
        let store = InMemoryStore::new();
        store
            .add_topic("alice", "c", "rust", Platform::Telegram)
            .await
            .unwrap();
        store.set_time("alice", "c", "rust", Platform::Telegram).await.unwrap();
        let recipients = store
            .get_users("c", &["rust".to_string()], Platform::Telegram, 60)
            .await
            .unwrap();
        assert!(recipients.is_empty());
    }

    #[tokio::test]
    async fn drain_delayed_is_fifo_and_deletes() {
        let store = InMemoryStore::new();
        for i in 0..3 {
            store
                .add_delayed(DelayedMessage {
                    user: "alice".to_string(),
                    platform: Platform::Telegram,
                    channel_display: "c".to_string(),
                    topic: "rust".to_string(),
                    summary: format!("msg {i}"),
                    link: "https://example.com".to_string(),
                })
                .await
                .unwrap();
        }
        let drained = store.drain_delayed("alice").await.unwrap();
        assert_eq!(
            drained.iter().map(|m| m.summary.clone()).collect::<Vec<_>>(),
            vec!["msg 0", "msg 1", "msg 2"]
        );
        assert!(store.drain_delayed("alice").await.unwrap().is_empty());
    }
}
