//! Environment configuration.

use std::env;
use std::time::Duration;

use assistant_api::url::DEFAULT_BASE_URL;
use assistant_api_mock::MOCK_BACKEND_ID;

pub const BACKEND_ENV_VAR: &str = "ASSISTANT_CHAT_BACKEND";
pub const HTTP_BACKEND_ID: &str = "openai";
pub const REQUEST_TIMEOUT_ENV_VAR: &str = "ASSISTANT_CHAT_REQUEST_TIMEOUT_SECS";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Http,
    Mock,
}

impl Backend {
    pub fn id(self) -> &'static str {
        match self {
            Self::Http => HTTP_BACKEND_ID,
            Self::Mock => MOCK_BACKEND_ID,
        }
    }
}

pub fn backend_for_id(backend_id: &str) -> Result<Backend, String> {
    match backend_id {
        HTTP_BACKEND_ID => Ok(Backend::Http),
        MOCK_BACKEND_ID => Ok(Backend::Mock),
        unknown => Err(format!(
            "Unsupported backend '{unknown}'. Available backends: {HTTP_BACKEND_ID}, {MOCK_BACKEND_ID}"
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub backend: Backend,
    pub base_url: String,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub proxy: Option<String>,
    /// Upper bound for a single HTTP request on the standard client.
    pub request_timeout: Duration,
}

impl HostConfig {
    pub fn from_env() -> Result<Self, String> {
        let backend = match env_string_opt(BACKEND_ENV_VAR) {
            Some(backend_id) => backend_for_id(backend_id.trim())?,
            None => Backend::Http,
        };
        Ok(Self {
            backend,
            base_url: env_string_opt("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            organization: env_string_opt("OPENAI_ORG_ID"),
            project: env_string_opt("OPENAI_PROJECT_ID"),
            proxy: env_string_opt("ASSISTANT_CHAT_PROXY"),
            request_timeout: request_timeout_from_env()?,
        })
    }
}

fn request_timeout_from_env() -> Result<Duration, String> {
    let Some(raw) = env_string_opt(REQUEST_TIMEOUT_ENV_VAR) else {
        return Ok(DEFAULT_REQUEST_TIMEOUT);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(format!(
            "{REQUEST_TIMEOUT_ENV_VAR} must be a positive number of seconds, got '{raw}'"
        )),
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
