//! Black-box coverage of the matcher collaborator client (spec §6).

use std::time::Duration;

use chanwatch::matcher::{build_request, parse_response, MatcherClient};

#[test]
fn build_request_carries_text_and_candidate_topics() {
    let topics = vec!["rust".to_string(), "wasm".to_string()];
    let request = build_request("new release", &topics);
    assert_eq!(request.text, "new release");
    assert_eq!(request.topics, &topics[..]);
}

#[test]
fn parse_response_rejects_malformed_body() {
    assert!(parse_response("{not json}").is_err());
}

#[tokio::test]
async fn unreachable_collaborator_surfaces_as_an_error_not_a_panic() {
    let client = MatcherClient::new("http://127.0.0.1:0", Duration::from_millis(200));
    let result = client.analyze("hello", &["rust".to_string()]).await;
    assert!(result.is_err());
}
