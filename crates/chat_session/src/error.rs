use std::time::Duration;

use assistant_api::{AssistantApiError, RetryError, RunStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing configuration: {}", .missing.join(", "))]
    ConfigurationMissing { missing: Vec<&'static str> },

    #[error("could not initialize the assistant client after {attempts} attempt(s): {source}")]
    ClientConstructionFailed {
        attempts: u32,
        #[source]
        source: AssistantApiError,
    },

    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    TransientNetwork {
        operation: String,
        attempts: u32,
        #[source]
        source: AssistantApiError,
    },

    #[error("{operation} was rejected by the assistant service: {source}")]
    Service {
        operation: String,
        #[source]
        source: AssistantApiError,
    },

    #[error("run {run_id} ended with status '{status}': {detail}")]
    RunTerminalFailure {
        run_id: String,
        status: RunStatus,
        detail: String,
    },

    #[error("run {run_id} did not finish within {timeout:?} (waited {elapsed:?})")]
    TimeoutExceeded {
        run_id: String,
        elapsed: Duration,
        timeout: Duration,
    },

    #[error("run {run_id} belongs to thread {run_thread_id}, expected {thread_id}")]
    StaleRun {
        run_id: String,
        thread_id: String,
        run_thread_id: String,
    },

    #[error("no conversation thread is active; initialize the session first")]
    NoThread,

    #[error("the assistant did not produce a new reply")]
    NoAssistantReply,

    #[error("prompt is empty")]
    EmptyPrompt,
}

impl SessionError {
    #[must_use]
    pub fn configuration_missing(missing: Vec<&'static str>) -> Self {
        Self::ConfigurationMissing { missing }
    }

    /// Classifies an exhausted retry by whether the last failure was transient.
    #[must_use]
    pub fn from_retry(error: RetryError<AssistantApiError>) -> Self {
        let RetryError {
            operation,
            attempts,
            last_error,
        } = error;
        if last_error.is_transient() {
            Self::TransientNetwork {
                operation,
                attempts,
                source: last_error,
            }
        } else {
            Self::Service {
                operation,
                source: last_error,
            }
        }
    }

    #[must_use]
    pub fn client_construction(error: RetryError<AssistantApiError>) -> Self {
        Self::ClientConstructionFailed {
            attempts: error.attempts,
            source: error.last_error,
        }
    }

    /// Run status when the turn failed because the run ended badly.
    pub fn run_status(&self) -> Option<RunStatus> {
        match self {
            Self::RunTerminalFailure { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short user-facing advice for the failure class, if one applies.
    pub fn remediation_hint(&self) -> Option<&'static str> {
        if matches!(self, Self::ConfigurationMissing { .. }) {
            return Some(
                "Set OPENAI_API_KEY and ASSISTANT_ID in the environment or the secrets file, or enter them when prompted.",
            );
        }
        if matches!(self, Self::NoThread) {
            return Some("Initialize the session again with /recover.");
        }

        let text = self.to_string().to_lowercase();
        if text.contains("api key") || text.contains("api_key") || text.contains("401") {
            Some("Check that the API key is valid and has access to the assistant.")
        } else if text.contains("rate limit") || text.contains("rate_limit") {
            Some("The service rate limit was reached. Wait a few minutes before retrying.")
        } else if text.contains("prox") {
            Some("Proxy settings broke client construction. Set FORCE_ENVIRONMENT=cloud and retry with /recover.")
        } else if text.contains("timeout")
            || text.contains("timed out")
            || text.contains("did not finish")
            || text.contains("network")
            || text.contains("connection")
        {
            Some("Check the network connection and retry with /recover.")
        } else if matches!(self, Self::RunTerminalFailure { .. }) {
            Some("Start a fresh conversation with /reset and try again.")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn exhausted_transient_retry_maps_to_network_error() {
        let error = SessionError::from_retry(RetryError {
            operation: "create_message".to_owned(),
            attempts: 3,
            last_error: AssistantApiError::Status(
                StatusCode::SERVICE_UNAVAILABLE,
                "overloaded".to_owned(),
            ),
        });

        assert!(matches!(
            error,
            SessionError::TransientNetwork { attempts: 3, .. }
        ));
        assert_eq!(
            error.to_string(),
            "create_message failed after 3 attempt(s): HTTP 503 Service Unavailable overloaded"
        );
    }

    #[test]
    fn rejected_request_maps_to_service_error() {
        let error = SessionError::from_retry(RetryError {
            operation: "create_run".to_owned(),
            attempts: 1,
            last_error: AssistantApiError::Status(StatusCode::BAD_REQUEST, "bad model".to_owned()),
        });

        assert!(matches!(error, SessionError::Service { .. }));
    }

    #[test]
    fn hints_follow_failure_class() {
        let missing = SessionError::configuration_missing(vec!["OPENAI_API_KEY"]);
        assert!(missing.remediation_hint().is_some_and(|hint| hint.contains("OPENAI_API_KEY")));

        let unauthorized = SessionError::Service {
            operation: "list_models".to_owned(),
            source: AssistantApiError::Status(StatusCode::UNAUTHORIZED, "Incorrect API key provided".to_owned()),
        };
        assert!(unauthorized.remediation_hint().is_some_and(|hint| hint.contains("API key")));

        let timeout = SessionError::TimeoutExceeded {
            run_id: "run_1".to_owned(),
            elapsed: Duration::from_secs(61),
            timeout: Duration::from_secs(60),
        };
        assert!(timeout.remediation_hint().is_some_and(|hint| hint.contains("network")));

        let proxy = SessionError::ClientConstructionFailed {
            attempts: 1,
            source: AssistantApiError::Unknown("unexpected keyword argument 'proxies'".to_owned()),
        };
        assert!(proxy.remediation_hint().is_some_and(|hint| hint.contains("FORCE_ENVIRONMENT")));

        assert_eq!(SessionError::NoAssistantReply.remediation_hint(), None);
    }
}
