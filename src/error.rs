//! Error taxonomy for the dispatch pipeline and its collaborators.
//!
//! Every variant maps to a row in the propagation policy (spec §7): most
//! errors are logged and swallowed at the event boundary by the dispatcher
//! worker (`dispatcher::worker`) rather than unwound past it.

use thiserror::Error;

/// Errors surfaced by the Store (spec §4.1).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database is unreachable or returned a connection error.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// A lookup found no row for the given key.
    #[error("not found: {0}")]
    NotFound(String),

    /// The single-writer actor's channel is closed.
    #[error("store writer channel closed")]
    WriterClosed,
}

/// Errors surfaced by the Matcher HTTP collaborator.
#[derive(Debug, Error)]
pub enum MatcherError {
    /// Network/transport failure reaching the matcher service.
    #[error("matcher transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The matcher responded with a non-2xx status or malformed body.
    #[error("matcher returned an error: {0}")]
    Semantic(String),

    /// The call exceeded its configured timeout.
    #[error("matcher call timed out")]
    Timeout,
}

/// Errors surfaced by the Summarizer HTTP collaborator.
///
/// Every variant here is recovered via the truncation fallback
/// (`summarizer::summarize_or_truncate`) — a `SummarizerError` is never a
/// reason to drop an event (spec §7).
#[derive(Debug, Error)]
pub enum SummarizerError {
    /// Network/transport failure reaching the summarizer service.
    #[error("summarizer transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The summarizer responded with a non-2xx status or malformed body.
    #[error("summarizer returned an error: {0}")]
    Semantic(String),

    /// The call exceeded its configured timeout.
    #[error("summarizer call timed out")]
    Timeout,
}

/// Errors surfaced by a platform adapter talking to its host API.
#[derive(Debug, Error)]
pub enum PlatformApiError {
    /// Network/transport failure.
    #[error("platform API transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The platform API returned a non-2xx status or an `ok: false` body.
    #[error("platform API error: {0}")]
    Api(String),

    /// The websocket connection dropped.
    #[error("platform stream disconnected: {0}")]
    Disconnected(String),
}

/// An inbound payload from a source adapter could not be normalized into an
/// [`crate::event::Event`].
#[derive(Debug, Error)]
#[error("malformed event: {0}")]
pub struct MalformedEvent(pub String);

/// How a dispatcher-worker-observed error should be handled, per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Recover silently (e.g. fall back to truncation) and continue processing
    /// this event.
    FallBack,
    /// Drop the event: log and move to the next one. No retry queue exists
    /// in the core.
    DropEvent,
}

/// Classify a summarizer failure. Always recovers via truncation.
pub fn classify_summarizer_error(_err: &SummarizerError) -> ErrorDisposition {
    ErrorDisposition::FallBack
}

/// Classify a matcher failure.
///
/// Transport/timeout errors and semantic errors both drop the event — the
/// matcher has no fallback path (spec §4.2, §7: "only matcher failure or
/// store failure causes event drop").
pub fn classify_matcher_error(_err: &MatcherError) -> ErrorDisposition {
    ErrorDisposition::DropEvent
}

/// Classify a store failure observed mid-event. Always drops the event.
pub fn classify_store_error(_err: &StoreError) -> ErrorDisposition {
    ErrorDisposition::DropEvent
}
