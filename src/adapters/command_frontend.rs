//! Inbound command API contract (spec §6) — out-of-core collaborator.
//!
//! DM/slash-command traffic (subscribe/unsubscribe/view/pause/continue) is
//! routed here by the Telegram and Mattermost listeners. The core only needs
//! the trait boundary; a full command parser is out of scope (spec §1). A
//! [`NullCommandFrontend`] default is provided so `chanwatchd` runs
//! standalone without a real front-end wired in.

use async_trait::async_trait;

use crate::event::Platform;
use crate::store::types::UserInfo;

/// The out-of-core command surface a DM/slash-command handler implements
/// (spec §6 "Inbound command API").
#[async_trait]
pub trait CommandFrontend: Send + Sync {
    /// Idempotent subscribe.
    async fn add(&self, user: &str, channel: &str, topic: &str, platform: Platform);

    /// Unsubscribe a single topic.
    async fn remove(&self, user: &str, channel: &str, topic: &str, platform: Platform);

    /// Unsubscribe every topic the user has on this channel.
    async fn remove_channel(&self, user: &str, channel: &str, platform: Platform);

    /// Grouped subscription view, rendered with [`format_view`].
    async fn view(&self, user: &str) -> String;

    /// Pause deliveries; they accumulate in the delayed-message queue.
    async fn pause(&self, user: &str);

    /// Resume deliveries and replay the delayed queue in FIFO order.
    async fn r#continue(&self, user: &str);
}

/// A no-op [`CommandFrontend`] that logs and reports everything as untracked.
///
/// `chanwatchd` wires this in when no real command front-end is configured,
/// so the ingestion/dispatch core still runs standalone (spec §1 scope: the
/// command-parsing front-end itself is out of core).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCommandFrontend;

#[async_trait]
impl CommandFrontend for NullCommandFrontend {
    async fn add(&self, _user: &str, _channel: &str, _topic: &str, _platform: Platform) {}
    async fn remove(&self, _user: &str, _channel: &str, _topic: &str, _platform: Platform) {}
    async fn remove_channel(&self, _user: &str, _channel: &str, _platform: Platform) {}

    async fn view(&self, _user: &str) -> String {
        format_view(&[])
    }

    async fn pause(&self, _user: &str) {}
    async fn r#continue(&self, _user: &str) {}
}

/// Render a [`UserInfo`] view the way the command front-end's `view` command
/// does (spec §7 "nothing tracked" empty state; spec §9 item C.1): grouped by
/// platform, then by resolved channel display name.
///
/// This lives here rather than in the front-end itself because the
/// dispatcher-adjacent store code is the one place that already knows how to
/// resolve VK group ids to cached public names (`Store::get_user_info`
/// already performs that resolution).
pub fn format_view(info: &UserInfo) -> String {
    if info.is_empty() {
        return "nothing tracked".to_string();
    }
    let mut out = String::new();
    for (platform, channels) in info {
        out.push_str(platform.as_str());
        out.push('\n');
        for (channel, topics) in channels {
            out.push_str(&format!("  {channel}: {}\n", topics.join(", ")));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_view_is_nothing_tracked() {
        assert_eq!(format_view(&[]), "nothing tracked");
    }

    #[test]
    fn view_groups_by_platform_then_channel() {
        let info = vec![(
            Platform::Vk,
            vec![("Rust News".to_string(), vec!["rust".to_string(), "wasm".to_string()])],
        )];
        let rendered = format_view(&info);
        assert!(rendered.contains("VK"));
        assert!(rendered.contains("Rust News: rust, wasm"));
    }

    #[tokio::test]
    async fn null_frontend_reports_nothing_tracked() {
        let frontend = NullCommandFrontend;
        assert_eq!(frontend.view("alice").await, "nothing tracked");
    }
}
