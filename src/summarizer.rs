//! Summarizer HTTP collaborator client (spec §6: OpenAI-style chat
//! completion) plus the Unicode-scalar-aware truncation fallback.
//!
//! Shaped like the teacher's `providers::openai` client. Unlike the
//! matcher, a failure here is never fatal to the event — callers always
//! fall back to [`truncate`] (spec §7: "`SummarizerError` is always
//! recovered via the truncation fallback").

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SummarizerError;

const INSTRUCTION: &str = "Summarize the following message in one short sentence.";

/// Request body for an OpenAI-style `POST /v1/chat/completions` call.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    /// Model name.
    pub model: String,
    /// The single-user-message conversation.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
}

/// A chat message.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"user"` — the core only ever sends one user message.
    pub role: String,
    /// The message content.
    pub content: String,
}

/// Response body from a chat-completion call.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    /// The model's completion choices; the core reads `choices[0]`.
    pub choices: Vec<ChatChoice>,
}

/// One completion choice.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    /// The completion message.
    pub message: ChatMessage,
}

/// Build the request body for a summarizer call.
pub fn build_request(model: &str, text: &str) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: format!("{INSTRUCTION}\n{text}"),
        }],
        temperature: 0.0,
    }
}

/// Parse a chat-completion response body into its summary text.
///
/// # Errors
///
/// Returns [`SummarizerError::Semantic`] if the body is not valid JSON in
/// the expected shape, or has no choices.
pub fn parse_response(body: &str) -> Result<String, SummarizerError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| SummarizerError::Semantic(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| SummarizerError::Semantic("summarizer returned no choices".to_string()))
}

/// The first `min(max_scalars, len(text))` Unicode scalar values of `text`.
///
/// This is the truncation fallback of spec §4.2 step 4 and the fix for the
/// off-by-one bug spec §9 calls out (some source revisions sliced at
/// `length - 1`, dropping the final scalar even when the text fit). Slicing
/// by `char` rather than by byte avoids splitting a multi-byte scalar in
/// half.
pub fn truncate(text: &str, max_scalars: usize) -> String {
    text.chars().take(max_scalars).collect()
}

/// A handle onto the (optional) Summarizer HTTP collaborator.
pub struct SummarizerClient {
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl SummarizerClient {
    /// Construct a client with the given base URL, model name, and per-call
    /// timeout (recommended 30 s, spec §5).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Summarize `text` via the collaborator.
    ///
    /// Callers are expected to fall back to [`truncate`] on any
    /// [`SummarizerError`] — this function itself never truncates.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizerError::Transport`] on a network/timeout failure,
    /// or [`SummarizerError::Semantic`] if the collaborator returns a
    /// non-2xx status or an unparseable body.
    pub async fn summarize(&self, text: &str) -> Result<String, SummarizerError> {
        let request = build_request(&self.model, text);
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SummarizerError::Semantic(format!(
                "summarizer returned status {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        parse_response(&body)
    }
}

/// Produce the notification summary for an event's text (spec §4.2 step 4):
/// call the summarizer when it is enabled and the text exceeds
/// `summary_len`, falling back to [`truncate`] on any failure or when the
/// summarizer is disabled or unneeded.
pub async fn summarize_or_truncate(
    client: Option<&SummarizerClient>,
    text: &str,
    summary_len: usize,
) -> String {
    if let Some(client) = client {
        if text.chars().count() > summary_len {
            match client.summarize(text).await {
                Ok(summary) => return summary,
                Err(_) => return truncate(text, summary_len),
            }
        }
    }
    truncate(text, summary_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_takes_exactly_summary_len_scalars_when_longer() {
        let text = "abcdefghij";
        assert_eq!(truncate(text, 5), "abcde");
    }

    #[test]
    fn truncate_returns_full_text_when_shorter() {
        let text = "short";
        assert_eq!(truncate(text, 50), "short");
    }

    #[test]
    fn truncate_zero_yields_empty_string() {
        assert_eq!(truncate("anything", 0), "");
    }

    #[test]
    fn truncate_counts_unicode_scalars_not_bytes() {
        // Each of these scalars is multi-byte in UTF-8; byte-truncation
        // would split one in half or count too few.
        let text = "日本語のテキスト";
        assert_eq!(truncate(text, 3), "日本語");
        assert_eq!(truncate(text, 3).chars().count(), 3);
    }

    #[test]
    fn build_request_embeds_instruction_and_text() {
        let request = build_request("gpt-4o-mini", "hello world");
        assert_eq!(request.messages.len(), 1);
        assert!(request.messages[0].content.contains("hello world"));
        assert!(request.messages[0].content.contains(INSTRUCTION));
    }

    #[test]
    fn parse_response_extracts_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"a summary"}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "a summary");
    }

    #[test]
    fn parse_response_rejects_no_choices() {
        let body = r#"{"choices":[]}"#;
        assert!(parse_response(body).is_err());
    }

    #[tokio::test]
    async fn summarize_or_truncate_without_client_always_truncates() {
        let text = "this text is definitely longer than ten chars";
        let summary = summarize_or_truncate(None, text, 10).await;
        assert_eq!(summary.chars().count(), 10);
    }

    #[tokio::test]
    async fn summarize_or_truncate_short_text_skips_collaborator_entirely() {
        // No client passed, and text is short: exercises the "under
        // summary_len" path without needing a live collaborator.
        let summary = summarize_or_truncate(None, "short", 50).await;
        assert_eq!(summary, "short");
    }
}
