//! Embedded schema for the five persisted tables of spec §6.
//!
//! Applied by `chanwatchd migrate` and automatically on [`super::SqliteStore::connect`].

/// The full `CREATE TABLE IF NOT EXISTS` schema.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    handle           TEXT NOT NULL,
    channel_id       TEXT NOT NULL,
    topic            TEXT NOT NULL,
    platform         TEXT NOT NULL,
    last_delivery_ts INTEGER,
    PRIMARY KEY (handle, channel_id, topic, platform)
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_channel
    ON subscriptions (channel_id, platform);

CREATE TABLE IF NOT EXISTS users (
    handle       TEXT PRIMARY KEY,
    transport_id TEXT NOT NULL,
    paused       INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS delayed (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    handle          TEXT NOT NULL,
    platform        TEXT NOT NULL,
    channel_display TEXT NOT NULL,
    topic           TEXT NOT NULL,
    summary         TEXT NOT NULL,
    link            TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_delayed_handle ON delayed (handle, id);

CREATE TABLE IF NOT EXISTS vk_cursor (
    group_id      TEXT PRIMARY KEY,
    last_post_id  INTEGER NOT NULL DEFAULT 0,
    public_name   TEXT
);

CREATE TABLE IF NOT EXISTS channel_name_cache (
    platform     TEXT NOT NULL,
    channel_id   TEXT NOT NULL,
    display_name TEXT NOT NULL,
    PRIMARY KEY (platform, channel_id)
);
"#;

/// Apply [`SCHEMA`] against a connection pool. Idempotent.
///
/// # Errors
///
/// Returns an error if any statement in the schema fails to execute.
pub async fn apply(pool: &sqlx::SqlitePool) -> Result<(), sqlx::Error> {
    // `raw_sql` executes the unprepared, multi-statement string as-is;
    // a prepared `query()` call only accepts a single statement.
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
