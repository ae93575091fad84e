//! Matcher HTTP collaborator client (spec §6: `POST /analyze`).
//!
//! Shaped like the teacher's `providers::openai` client: typed
//! request/response structs, free `build_request`/`parse_response`
//! functions kept separate from the network call for unit testability, and
//! an `async_trait` wrapper around a `reqwest::Client`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MatcherError;

/// Request body for `POST /analyze`.
#[derive(Debug, Serialize)]
pub struct AnalyzeRequest<'a> {
    /// The post text to classify.
    pub text: &'a str,
    /// The candidate topic substrings to test against.
    pub topics: &'a [String],
}

/// Response body from `POST /analyze`.
#[derive(Debug, Deserialize)]
pub struct AnalyzeResponse {
    /// The subset of candidate topics that matched.
    pub topics: Vec<String>,
}

/// Build the request body for a matcher call. Kept separate from the network
/// call so its shape can be unit-tested without a live collaborator.
pub fn build_request<'a>(text: &'a str, topics: &'a [String]) -> AnalyzeRequest<'a> {
    AnalyzeRequest { text, topics }
}

/// Parse a matcher response body.
///
/// # Errors
///
/// Returns [`MatcherError::Semantic`] if the body is not valid JSON in the
/// expected shape.
pub fn parse_response(body: &str) -> Result<AnalyzeResponse, MatcherError> {
    serde_json::from_str(body).map_err(|e| MatcherError::Semantic(e.to_string()))
}

/// A handle onto the Matcher HTTP collaborator.
pub struct MatcherClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl MatcherClient {
    /// Construct a client with the given base URL and per-call timeout
    /// (recommended 10 s, spec §5).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Classify `text` against `candidate_topics` (spec §4.2 step 3).
    ///
    /// Callers must never invoke this with an empty `candidate_topics` (spec
    /// §8 invariant) — the dispatcher worker short-circuits before reaching
    /// here when `get_topics` returns empty.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::Transport`] on a network/timeout failure, or
    /// [`MatcherError::Semantic`] if the collaborator returns a non-2xx
    /// status or an unparseable body.
    pub async fn analyze(
        &self,
        text: &str,
        candidate_topics: &[String],
    ) -> Result<Vec<String>, MatcherError> {
        let request = build_request(text, candidate_topics);
        let response = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MatcherError::Semantic(format!(
                "matcher returned status {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        let parsed = parse_response(&body)?;
        Ok(parsed.topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_carries_text_and_topics() {
        let topics = vec!["rust".to_string(), "wasm".to_string()];
        let request = build_request("new rust release", &topics);
        assert_eq!(request.text, "new rust release");
        assert_eq!(request.topics, &topics[..]);
    }

    #[test]
    fn parse_response_extracts_matched_topics() {
        let parsed = parse_response(r#"{"topics": ["rust"]}"#).unwrap();
        assert_eq!(parsed.topics, vec!["rust".to_string()]);
    }

    #[test]
    fn parse_response_rejects_malformed_body() {
        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn parse_response_accepts_empty_match_list() {
        let parsed = parse_response(r#"{"topics": []}"#).unwrap();
        assert!(parsed.topics.is_empty());
    }
}
