use std::collections::BTreeMap;

use assistant_api::headers::*;
use assistant_api::{AssistantApiConfig, AssistantApiError};

#[test]
fn headers_carry_bearer_token_and_json_content_type() {
    let config = AssistantApiConfig::new("  sk-test  ");
    let headers = build_headers(&config, &BTreeMap::new()).expect("headers");

    assert_eq!(
        headers.get(HEADER_AUTHORIZATION).map(String::as_str),
        Some("Bearer sk-test")
    );
    assert_eq!(
        headers.get(HEADER_CONTENT_TYPE).map(String::as_str),
        Some("application/json")
    );
    assert!(headers
        .get(HEADER_USER_AGENT)
        .is_some_and(|ua| ua.starts_with("assistant-chat/")));
    assert!(!headers.contains_key(HEADER_OPENAI_BETA));
}

#[test]
fn blank_api_key_is_rejected() {
    let error = build_headers(&AssistantApiConfig::new(" "), &BTreeMap::new())
        .expect_err("blank key");
    assert!(matches!(error, AssistantApiError::MissingApiKey));
}

#[test]
fn organization_and_project_are_optional() {
    let config = AssistantApiConfig::new("sk-test")
        .with_organization("org-1")
        .with_project(" ");
    let headers = build_headers(&config, &BTreeMap::new()).expect("headers");

    assert_eq!(
        headers.get(HEADER_ORGANIZATION).map(String::as_str),
        Some("org-1")
    );
    assert!(!headers.contains_key(HEADER_PROJECT));
}

#[test]
fn client_default_headers_override_configured_extras() {
    let mut config = AssistantApiConfig::new("sk-test").with_user_agent("custom-agent");
    config
        .extra_headers
        .insert("X-Trace".to_owned(), " abc ".to_owned());
    let mut defaults = BTreeMap::new();
    defaults.insert(
        HEADER_OPENAI_BETA.to_owned(),
        ASSISTANTS_PROTOCOL_VERSION.to_owned(),
    );

    let headers = build_headers(&config, &defaults).expect("headers");

    assert_eq!(headers.get("x-trace").map(String::as_str), Some("abc"));
    assert_eq!(
        headers.get(HEADER_USER_AGENT).map(String::as_str),
        Some("custom-agent")
    );
    assert_eq!(
        headers.get(HEADER_OPENAI_BETA).map(String::as_str),
        Some("assistants=v2")
    );
}
