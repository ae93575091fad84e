//! Source-agnostic types passed between adapters, the dispatcher, and the
//! sender, plus the stable sharding hash that gives per-channel FIFO.

use serde::{Deserialize, Serialize};

/// A platform this bus ingests posts from and delivers notifications to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    /// Telegram-style bot API.
    Telegram,
    /// VK-style social API.
    Vk,
    /// Mattermost-style team chat API.
    Mattermost,
}

impl Platform {
    /// The short tag used in persisted rows and log fields (`TG`/`VK`/`MM`).
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Telegram => "TG",
            Platform::Vk => "VK",
            Platform::Mattermost => "MM",
        }
    }

    /// Parse the short tag back into a [`Platform`].
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "TG" => Some(Platform::Telegram),
            "VK" => Some(Platform::Vk),
            "MM" => Some(Platform::Mattermost),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A history-on-demand marker carried by an [`Event`] produced in response to
/// an explicit VK `UserHistory` request (spec §4.4). Bypasses cooldown and
/// pause, and does not touch `last_delivery_ts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    /// The requesting user's handle.
    pub user: String,
}

/// The pipeline-internal, platform-agnostic form of a post under
/// consideration. Immutable once produced by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Which platform this post arrived on.
    pub platform: Platform,
    /// Human-readable channel display name.
    pub channel: String,
    /// Opaque-within-platform channel identifier; the key used for sharding
    /// and all Store lookups.
    pub channel_id: String,
    /// The post's raw text.
    pub text: String,
    /// A deep link to the post on its origin platform.
    pub link: String,
    /// The platform-local message id.
    pub message_id: String,
    /// Present only for events produced to satisfy an explicit VK history
    /// request.
    pub history_request: Option<HistoryRequest>,
}

impl Event {
    /// Construct an ordinary (non-history) event.
    pub fn new(
        platform: Platform,
        channel: impl Into<String>,
        channel_id: impl Into<String>,
        text: impl Into<String>,
        link: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            channel: channel.into(),
            channel_id: channel_id.into(),
            text: text.into(),
            link: link.into(),
            message_id: message_id.into(),
            history_request: None,
        }
    }

    /// Attach a history-request marker, turning this into a history event.
    pub fn with_history_request(mut self, user: impl Into<String>) -> Self {
        self.history_request = Some(HistoryRequest { user: user.into() });
        self
    }
}

/// The pipeline-internal, addressed, ready-to-render output of the
/// dispatcher, consumed by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The recipient's handle.
    pub user: String,
    /// Which platform to deliver over.
    pub platform: Platform,
    /// Human-readable channel display name.
    pub channel_display: String,
    /// Comma-joined, de-duplicated matched topics.
    pub topics_joined: String,
    /// The summary (LLM-produced or truncated) of the originating post.
    pub summary: String,
    /// A deep link to the originating post.
    pub link: String,
}

/// A stable (not `std`'s randomized `SipHash`) 32-bit hash used to shard
/// events and history requests by channel identifier. Uses the FNV-1a
/// algorithm: fixed, portable across process restarts, and small enough to
/// inline at every enqueue site.
fn fnv1a_32(bytes: &[u8]) -> u32 {
    const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Stable hash of a channel identifier, for use as `h(channel_id)` in spec
/// §4.2's `work_q[h(channel_id) mod N_WORK]` sharding rule.
///
/// Stable across process restarts and platforms, unlike a
/// [`std::hash::Hasher`]-based hash, which `std` explicitly does not
/// guarantee to be stable.
pub fn stable_hash(key: &str) -> u32 {
    fnv1a_32(key.as_bytes())
}

/// Which of `n` shards a channel identifier routes to. Used both by the
/// dispatcher producer (`h(channel_id) mod N_WORK`) and by the VK adapter's
/// group partitioning (`h(g) mod N_VK`) and history-worker routing
/// (`h(public_name) mod N_VK_HIST`) — spec §4.2, §4.4.
///
/// # Panics
///
/// Panics if `n` is zero; callers always pass a configured positive worker
/// count.
pub fn shard_of(key: &str, n: usize) -> usize {
    assert!(n > 0, "shard count must be positive");
    let h = stable_hash(key);
    // usize is at least as wide as u32 on every supported target; the
    // subsequent `% n` brings the result into range regardless.
    #[allow(clippy::cast_possible_truncation)]
    let h = h as usize;
    h % n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_tag() {
        for p in [Platform::Telegram, Platform::Vk, Platform::Mattermost] {
            assert_eq!(Platform::parse(p.as_str()), Some(p));
        }
    }

    #[test]
    fn unknown_tag_does_not_parse() {
        assert_eq!(Platform::parse("XX"), None);
    }

    #[test]
    fn stable_hash_is_deterministic() {
        assert_eq!(stable_hash("42"), stable_hash("42"));
        assert_eq!(shard_of("42", 30), shard_of("42", 30));
    }

    #[test]
    fn shard_of_is_in_range() {
        for key in ["42", "@news", "some-channel-id", ""] {
            assert!(shard_of(key, 30) < 30);
        }
    }

    #[test]
    fn same_channel_same_shard_every_time() {
        let shards: Vec<usize> = (0..10).map(|_| shard_of("channel-123", 30)).collect();
        assert!(shards.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn history_request_is_attachable() {
        let ev = Event::new(Platform::Vk, "news", "42", "hello", "https://vk.com/x", "1")
            .with_history_request("bob");
        assert_eq!(ev.history_request.unwrap().user, "bob");
    }

    #[test]
    #[should_panic(expected = "shard count must be positive")]
    fn shard_of_rejects_zero_workers() {
        let _ = shard_of("x", 0);
    }
}
