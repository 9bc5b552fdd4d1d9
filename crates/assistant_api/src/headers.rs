use std::collections::BTreeMap;

use crate::config::AssistantApiConfig;
use crate::error::AssistantApiError;

pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_ORGANIZATION: &str = "OpenAI-Organization";
pub const HEADER_PROJECT: &str = "OpenAI-Project";
pub const HEADER_OPENAI_BETA: &str = "OpenAI-Beta";
pub const HEADER_USER_AGENT: &str = "User-Agent";

/// Protocol version required by the threads/runs surface.
pub const ASSISTANTS_PROTOCOL_VERSION: &str = "assistants=v2";

/// Build a deterministic header map for assistant service requests.
///
/// `default_headers` is the client's mutable header map and is applied last, so
/// values set after construction win over configured extras.
pub fn build_headers(
    config: &AssistantApiConfig,
    default_headers: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, AssistantApiError> {
    let api_key = config.api_key.trim();
    if api_key.is_empty() {
        return Err(AssistantApiError::MissingApiKey);
    }

    let mut headers = BTreeMap::new();
    headers.insert(
        HEADER_AUTHORIZATION.to_owned(),
        format!("Bearer {api_key}"),
    );
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );
    headers.insert(HEADER_ACCEPT.to_owned(), "application/json".to_owned());

    if let Some(organization) = config.organization.as_deref().and_then(sanitize_nonempty) {
        headers.insert(HEADER_ORGANIZATION.to_owned(), organization);
    }
    if let Some(project) = config.project.as_deref().and_then(sanitize_nonempty) {
        headers.insert(HEADER_PROJECT.to_owned(), project);
    }

    let ua = config
        .user_agent
        .as_deref()
        .and_then(sanitize_nonempty)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    for (key, value) in default_headers {
        headers.insert(key.trim().to_owned(), value.trim().to_owned());
    }

    Ok(headers)
}

fn sanitize_nonempty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn default_user_agent() -> String {
    format!(
        "assistant-chat/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        normalize_arch(std::env::consts::ARCH)
    )
}

fn normalize_arch(arch: &str) -> String {
    match arch.to_ascii_lowercase().as_str() {
        "x86_64" | "amd64" => "x64".to_owned(),
        "x86" | "i386" | "i686" => "ia32".to_owned(),
        "aarch64" => "arm64".to_owned(),
        normalized => normalized.to_owned(),
    }
}
