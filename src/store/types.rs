//! Entity structs persisted by the Store (spec §3, §6).

use crate::event::Platform;

/// A (user, channel, topic, platform) subscription row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Subscriber's handle.
    pub user: String,
    /// Channel identifier (opaque within the platform).
    pub channel_id: String,
    /// The subscribed-to topic substring.
    pub topic: String,
    /// Which platform this channel lives on.
    pub platform: Platform,
    /// Unix-epoch seconds of the last delivery for this exact tuple, or
    /// `None` if never delivered.
    pub last_delivery_ts: Option<i64>,
}

/// A registered user: handle, transport address, pause flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique handle.
    pub handle: String,
    /// Opaque transport id the delivery transport needs to address this
    /// user (e.g. a Telegram chat id).
    pub transport_id: String,
    /// Whether deliveries to this user are currently queued for replay
    /// instead of sent immediately.
    pub paused: bool,
}

/// A notification persisted for later replay because its recipient was
/// paused at delivery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedMessage {
    /// Recipient's handle.
    pub user: String,
    /// Which platform the originating post came from.
    pub platform: Platform,
    /// The originating channel's display name.
    pub channel_display: String,
    /// Comma-joined topic list that matched.
    pub topic: String,
    /// The summary (or truncated text) of the originating post.
    pub summary: String,
    /// A deep link to the originating post.
    pub link: String,
}

/// A VK group's poll cursor: last seen post id plus cached public name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VkCursor {
    /// The VK group id (numeric string).
    pub group_id: String,
    /// The highest post id already emitted as an Event for this group.
    pub last_post_id: i64,
    /// The group's cached public display name, if known.
    pub public_name: Option<String>,
}

/// Grouped subscription view for the `view` front-end command (spec §4.1
/// `get_user_info`, §9 item C.1): platform → channel display name → topics.
pub type UserInfo = Vec<(Platform, Vec<(String, Vec<String>)>)>;
