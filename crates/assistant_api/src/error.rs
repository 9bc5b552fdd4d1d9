use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

use crate::builder::ConstructionStrategy;
use crate::retry::is_retryable_http_error;

#[derive(Debug)]
pub enum AssistantApiError {
    MissingApiKey,
    InvalidBaseUrl(String),
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    NotFound(String),
    Serde(JsonError),
    ClientConstruction {
        strategy: ConstructionStrategy,
        message: String,
    },
    Unknown(String),
}

impl AssistantApiError {
    /// Whether this failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(error) => {
                error.is_timeout()
                    || error.is_connect()
                    || error.is_request()
                    || error.is_body()
                    || error.is_decode()
            }
            Self::Status(status, message) => {
                matches!(status.as_u16(), 408 | 409)
                    || is_retryable_http_error(status.as_u16(), message)
            }
            Self::Unknown(_) => true,
            Self::MissingApiKey
            | Self::InvalidBaseUrl(_)
            | Self::InvalidHeader(_)
            | Self::NotFound(_)
            | Self::Serde(_)
            | Self::ClientConstruction { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
            || matches!(self, Self::Status(status, _) if *status == StatusCode::NOT_FOUND)
    }
}

/// `{"error": {...}}` body returned by the service on failure.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl ErrorDetail {
    fn is_rate_limit(&self, status: StatusCode) -> bool {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return true;
        }
        [self.code.as_deref(), self.kind.as_deref()]
            .into_iter()
            .flatten()
            .any(|code| {
                code.eq_ignore_ascii_case("rate_limit_exceeded")
                    || code.eq_ignore_ascii_case("insufficient_quota")
            })
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|message| !message.is_empty())
    }
}

impl fmt::Display for AssistantApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "API key is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "network request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::NotFound(resource) => write!(f, "resource not found: {resource}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::ClientConstruction { strategy, message } => {
                write!(
                    f,
                    "could not initialize assistant client ({} strategy): {message}",
                    strategy.as_str()
                )
            }
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for AssistantApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AssistantApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for AssistantApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Human-readable message for a failed response body.
///
/// Rate-limit failures get a fixed wording with the service detail appended;
/// otherwise the service's own message is used, then the raw body, then the
/// status reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error);

    if let Some(detail) = &detail {
        if detail.is_rate_limit(status) {
            let suffix = detail
                .message()
                .map(|message| format!(" ({message})"))
                .unwrap_or_default();
            return format!(
                "rate limit reached for the assistant service{suffix}. Try again in a few minutes."
            );
        }
        if let Some(message) = detail.message() {
            return message.to_owned();
        }
    }

    if !body.is_empty() {
        return body.to_owned();
    }
    status
        .canonical_reason()
        .map_or_else(|| "request failed".to_owned(), str::to_owned)
}
