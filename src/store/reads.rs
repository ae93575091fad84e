//! Concurrent, pool-backed read queries.
//!
//! Every function here runs directly against the shared [`sqlx::SqlitePool`]
//! — SQLite allows any number of concurrent readers, so reads need no
//! serialization through [`super::writer`].

use crate::event::Platform;
use crate::store::types::UserInfo;

/// All distinct topics anyone subscribes to on this channel (spec §4.1
/// `get_topics`).
///
/// # Errors
///
/// Returns an error on a database failure.
pub async fn get_topics(
    db: &sqlx::SqlitePool,
    channel: &str,
    platform: Platform,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT topic FROM subscriptions WHERE channel_id = ? AND platform = ?",
    )
    .bind(channel)
    .bind(platform.as_str())
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(|(topic,)| topic).collect())
}

/// Grouped subscription view for the `view` front-end command (spec §4.1
/// `get_user_info`): platform → resolved channel display name → topics.
///
/// VK group ids are resolved to their cached public name; channels with no
/// cached name (Telegram public chats, Mattermost) fall back to the raw
/// channel id.
///
/// # Errors
///
/// Returns an error on a database failure.
pub async fn get_user_info(db: &sqlx::SqlitePool, user: &str) -> Result<UserInfo, sqlx::Error> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT platform, channel_id, topic FROM subscriptions WHERE handle = ? ORDER BY platform, channel_id, topic",
    )
    .bind(user)
    .fetch_all(db)
    .await?;

    let mut grouped: Vec<(Platform, Vec<(String, Vec<String>)>)> = Vec::new();
    for (platform_tag, channel_id, topic) in rows {
        let Some(platform) = Platform::parse(&platform_tag) else {
            continue;
        };
        let display_name = resolve_display_name(db, platform, &channel_id).await?;

        let bucket_idx = match grouped.iter().position(|(p, _)| *p == platform) {
            Some(idx) => idx,
            None => {
                let idx = grouped.len();
                grouped.push((platform, Vec::new()));
                idx
            }
        };
        let platform_bucket = &mut grouped[bucket_idx].1;
        match platform_bucket
            .iter_mut()
            .find(|(name, _)| *name == display_name)
        {
            Some((_, topics)) => topics.push(topic),
            None => platform_bucket.push((display_name, vec![topic])),
        }
    }
    Ok(grouped)
}

/// Resolve a channel id to a display name: VK groups resolve via
/// `vk_cursor.public_name`, Telegram/Mattermost private channels via
/// `channel_name_cache`; anything uncached falls back to the raw id.
async fn resolve_display_name(
    db: &sqlx::SqlitePool,
    platform: Platform,
    channel_id: &str,
) -> Result<String, sqlx::Error> {
    if platform == Platform::Vk {
        if let Some(name) = get_vk_public_name(db, channel_id).await? {
            return Ok(name);
        }
    } else if let Some(name) = get_chan_name(db, platform, channel_id).await? {
        return Ok(name);
    }
    Ok(channel_id.to_string())
}

/// All (user, topic) pairs subscribed to any of `topics` on `channel`, whose
/// per-subscription cooldown has elapsed (spec §4.1 `get_users`).
///
/// # Errors
///
/// Returns an error on a database failure or if `topics` is empty (the
/// caller never calls this with an empty topic list — spec §8 invariant
/// "matcher is never called with an empty candidate list" implies its
/// output, if empty, short-circuits before reaching here).
pub async fn get_users(
    db: &sqlx::SqlitePool,
    channel: &str,
    topics: &[String],
    platform: Platform,
    cooldown_secs: i64,
) -> Result<Vec<(String, Vec<String>)>, sqlx::Error> {
    if topics.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = std::iter::repeat("?")
        .take(topics.len())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT handle, topic FROM subscriptions \
         WHERE channel_id = ? AND platform = ? AND topic IN ({placeholders}) \
         AND (last_delivery_ts IS NULL OR last_delivery_ts < strftime('%s','now') - ?)"
    );
    let mut query = sqlx::query_as::<_, (String, String)>(&sql)
        .bind(channel)
        .bind(platform.as_str());
    for topic in topics {
        query = query.bind(topic);
    }
    query = query.bind(cooldown_secs);
    let rows = query.fetch_all(db).await?;

    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (user, topic) in rows {
        match grouped.iter_mut().find(|(u, _)| *u == user) {
            Some((_, topics)) => topics.push(topic),
            None => grouped.push((user, vec![topic])),
        }
    }
    Ok(grouped)
}

/// Whether at least one subscription exists for this channel (spec §4.1
/// `contains_channel`).
///
/// # Errors
///
/// Returns an error on a database failure.
pub async fn contains_channel(
    db: &sqlx::SqlitePool,
    channel: &str,
    platform: Platform,
) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM subscriptions WHERE channel_id = ? AND platform = ? LIMIT 1",
    )
    .bind(channel)
    .bind(platform.as_str())
    .fetch_optional(db)
    .await?;
    Ok(row.is_some())
}

/// Whether a user's deliveries are currently paused (spec §4.1 `is_paused`).
///
/// Treats an unknown handle as not paused.
///
/// # Errors
///
/// Returns an error on a database failure.
pub async fn is_paused(db: &sqlx::SqlitePool, user: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT paused FROM users WHERE handle = ?")
        .bind(user)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|(paused,)| paused != 0).unwrap_or(false))
}

/// The opaque transport id a handle maps to (spec §4.1 `get_id`).
///
/// # Errors
///
/// Returns an error on a database failure.
pub async fn get_id(db: &sqlx::SqlitePool, handle: &str) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT transport_id FROM users WHERE handle = ?")
        .bind(handle)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|(id,)| id))
}

/// All watched VK group ids (spec §4.1, §4.4 bootstrap).
///
/// # Errors
///
/// Returns an error on a database failure.
pub async fn get_vk_groups(db: &sqlx::SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT group_id FROM vk_cursor")
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// A VK group's last-seen post id, or 0 if the group has no cursor row yet.
///
/// # Errors
///
/// Returns an error on a database failure.
pub async fn get_vk_last_post(db: &sqlx::SqlitePool, group_id: &str) -> Result<i64, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT last_post_id FROM vk_cursor WHERE group_id = ?")
            .bind(group_id)
            .fetch_optional(db)
            .await?;
    Ok(row.map(|(id,)| id).unwrap_or(0))
}

/// A VK group's cached public display name, if known.
///
/// # Errors
///
/// Returns an error on a database failure.
pub async fn get_vk_public_name(
    db: &sqlx::SqlitePool,
    group_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT public_name FROM vk_cursor WHERE group_id = ?")
            .bind(group_id)
            .fetch_optional(db)
            .await?;
    Ok(row.and_then(|(name,)| name))
}

/// A private channel's cached display name (Telegram/Mattermost).
///
/// # Errors
///
/// Returns an error on a database failure.
pub async fn get_chan_name(
    db: &sqlx::SqlitePool,
    platform: Platform,
    channel_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT display_name FROM channel_name_cache WHERE platform = ? AND channel_id = ?",
    )
    .bind(platform.as_str())
    .bind(channel_id)
    .fetch_optional(db)
    .await?;
    Ok(row.map(|(name,)| name))
}
