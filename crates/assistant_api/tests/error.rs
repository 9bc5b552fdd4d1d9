use reqwest::StatusCode;

use assistant_api::error::parse_error_message;
use assistant_api::AssistantApiError;

#[test]
fn parse_error_message_is_friendly_on_rate_limit() {
    let body = r#"{"error":{"code":"rate_limit_exceeded","message":"Rate limit reached for gpt-4o-mini","type":"requests"}}"#;

    let message = parse_error_message(StatusCode::TOO_MANY_REQUESTS, body);
    assert!(message.starts_with("rate limit reached"));
    assert!(message.contains("gpt-4o-mini"));
}

#[test]
fn parse_error_message_uses_json_message() {
    let body = r#"{"error":{"code":null,"message":"No assistant found with id 'asst_x'.","type":"invalid_request_error"}}"#;
    let message = parse_error_message(StatusCode::BAD_REQUEST, body);
    assert_eq!(message, "No assistant found with id 'asst_x'.");
}

#[test]
fn parse_error_message_falls_back_to_raw_body_or_reason() {
    assert_eq!(
        parse_error_message(StatusCode::INTERNAL_SERVER_ERROR, "raw failure text"),
        "raw failure text"
    );
    assert_eq!(
        parse_error_message(StatusCode::BAD_GATEWAY, ""),
        "Bad Gateway"
    );
}

#[test]
fn transient_classification_follows_status() {
    assert!(AssistantApiError::Status(StatusCode::SERVICE_UNAVAILABLE, "x".into()).is_transient());
    assert!(AssistantApiError::Status(StatusCode::CONFLICT, "run active".into()).is_transient());
    assert!(!AssistantApiError::Status(StatusCode::UNAUTHORIZED, "bad key".into()).is_transient());
    assert!(!AssistantApiError::NotFound("threads/t1".into()).is_transient());
}

#[test]
fn not_found_covers_plain_404_status() {
    assert!(AssistantApiError::NotFound("threads/t1".into()).is_not_found());
    assert!(AssistantApiError::Status(StatusCode::NOT_FOUND, "gone".into()).is_not_found());
    assert!(!AssistantApiError::Status(StatusCode::GONE, "gone".into()).is_not_found());
}
