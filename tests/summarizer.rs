//! Black-box coverage of the summarizer collaborator client and its
//! truncation fallback (spec §4.2 step 4, §7, §9).

use std::time::Duration;

use chanwatch::summarizer::{summarize_or_truncate, truncate, SummarizerClient};

#[test]
fn truncate_is_unicode_scalar_aware() {
    let text = "日本語のテキスト";
    let truncated = truncate(text, 3);
    assert_eq!(truncated.chars().count(), 3);
    assert_eq!(truncated, "日本語");
}

#[test]
fn truncate_never_panics_on_max_larger_than_input() {
    assert_eq!(truncate("short", 100), "short");
}

#[tokio::test]
async fn summarize_or_truncate_falls_back_without_a_configured_client() {
    let text = "this message is long enough to need summarizing down to size";
    let summary = summarize_or_truncate(None, text, 12).await;
    assert_eq!(summary.chars().count(), 12);
}

#[tokio::test]
async fn summarize_or_truncate_skips_the_collaborator_for_short_text() {
    let summary = summarize_or_truncate(None, "tiny", 50).await;
    assert_eq!(summary, "tiny");
}

#[tokio::test]
async fn unreachable_summarizer_falls_back_to_truncation_not_an_error() {
    let client = SummarizerClient::new("http://127.0.0.1:0", "gpt-4o-mini", Duration::from_millis(200));
    let text = "this message is long enough to need summarizing down to size";
    let summary = summarize_or_truncate(Some(&client), text, 10).await;
    assert_eq!(summary, truncate(text, 10));
}
