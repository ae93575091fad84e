//! `chanwatch` — a topic-keeper notification bus.
//!
//! Watches posts from several platforms, matches them against per-(user,
//! channel, topic) subscriptions via an external matcher collaborator,
//! optionally summarizes them via an external summarizer collaborator, and
//! delivers formatted notifications back to subscribers.

pub mod adapters;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod logging;
pub mod matcher;
pub mod sender;
pub mod store;
pub mod summarizer;
pub mod transport;
