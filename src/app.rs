use std::future;
use std::sync::Arc;
use std::time::Duration;

use assistant_api::{with_retry, Environment, EnvironmentReport, RetryPolicy};
use chat_session::{
    CredentialField, CredentialResolver, DriverOptions, Session, SessionCache, SessionDriver,
    SessionError, SessionPhase,
};
use tracing::{error, info, warn};

use crate::connector::Connector;

pub const CONNECT_RETRIES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub connected: bool,
    pub recovery_attempts: u32,
    pub environment: String,
    pub thread_id: Option<String>,
    pub phase: SessionPhase,
    pub last_error: Option<String>,
    pub show_remediation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Host-facing chat surface: one user, one session.
pub struct ChatApp {
    connector: Arc<dyn Connector>,
    session: Session,
    credentials: SessionCache,
    driver: Option<SessionDriver>,
    driver_options: DriverOptions,
    connect_retry: RetryPolicy,
    client_error: Option<String>,
}

impl ChatApp {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            session: Session::new(),
            credentials: SessionCache::default(),
            driver: None,
            driver_options: DriverOptions::default(),
            connect_retry: RetryPolicy::new(CONNECT_RETRIES, Duration::from_secs(1)),
            client_error: None,
        }
    }

    pub fn with_driver_options(mut self, options: DriverOptions) -> Self {
        self.driver_options = options;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Values cached from earlier resolutions; register it first in resolvers.
    pub fn credential_cache(&self) -> SessionCache {
        self.credentials.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.driver.is_some()
    }

    /// Resolves credentials, builds a client, and makes sure a live thread exists.
    pub async fn initialize_session(
        &mut self,
        mut resolver: CredentialResolver,
    ) -> Result<(), SessionError> {
        let result = self.connect_and_initialize(&mut resolver).await;
        if let Err(init_error) = &result {
            error!(error = %init_error, "session initialization failed");
            if self.driver.is_none() {
                self.session.record_failure(init_error);
            }
        }
        result
    }

    async fn connect_and_initialize(
        &mut self,
        resolver: &mut CredentialResolver,
    ) -> Result<(), SessionError> {
        if self.driver.is_none() {
            let credentials = resolver.resolve()?;
            self.credentials.store(&credentials);

            let connector = Arc::clone(&self.connector);
            let service = with_retry("client_construction", &self.connect_retry, || {
                future::ready(connector.connect(&credentials))
            })
            .await
            .map_err(|failure| {
                self.client_error = Some(failure.last_error.to_string());
                SessionError::client_construction(failure)
            })?;
            self.client_error = None;

            self.driver = Some(
                SessionDriver::new(service, credentials.assistant_id.clone())
                    .with_model(Some(credentials.model.clone()))
                    .with_options(self.driver_options.clone()),
            );
        }

        let Some(driver) = &self.driver else {
            return Err(SessionError::NoThread);
        };
        driver.initialize(&mut self.session).await?;
        info!(thread_id = ?self.session.thread_id(), "session ready");
        Ok(())
    }

    pub async fn submit_prompt(&mut self, text: &str) -> Result<String, SessionError> {
        match &self.driver {
            Some(driver) => driver.submit_prompt(&mut self.session, text).await,
            None => {
                let failure = SessionError::NoThread;
                warn!(error = %failure, "prompt submitted before the session was initialized");
                self.session.record_failure(&failure);
                Err(failure)
            }
        }
    }

    pub fn session_diagnostics(&self) -> SessionDiagnostics {
        SessionDiagnostics {
            connected: self.driver.is_some(),
            recovery_attempts: self.session.recovery().get(),
            environment: self.environment_label().to_owned(),
            thread_id: self.session.thread_id().map(str::to_owned),
            phase: self.session.phase(),
            last_error: self.session.last_error().map(str::to_owned),
            show_remediation: self.session.recovery().needs_remediation(),
        }
    }

    /// Clears the error state, rebuilds the client, and repairs the thread.
    pub async fn force_recovery(&mut self, resolver: CredentialResolver) -> Result<(), SessionError> {
        info!(
            recovery_attempts = self.session.recovery().get(),
            "forcing session recovery"
        );
        self.session.clear_error();
        self.client_error = None;
        self.driver = None;
        self.initialize_session(resolver).await
    }

    /// Starts a new thread with an empty history.
    pub async fn reset_conversation(&mut self) -> Result<(), SessionError> {
        self.session.reset_conversation();
        let Some(driver) = &self.driver else {
            return Ok(());
        };
        driver.initialize(&mut self.session).await
    }

    /// Drops every piece of session state, cached credentials included.
    pub fn full_reset(&mut self) {
        self.session.full_reset();
        self.credentials.clear();
        self.driver = None;
        self.client_error = None;
        info!("session fully reset");
    }

    pub fn readiness(&self) -> Readiness {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.credentials.get(CredentialField::ApiKey).is_none() {
            errors.push("API key is not configured".to_owned());
        }
        if self.credentials.get(CredentialField::AssistantId).is_none() {
            errors.push("assistant id is not configured".to_owned());
        }
        if self.session.thread_id().is_none() {
            errors.push("conversation thread is not initialized".to_owned());
        }
        if let Some(client_error) = &self.client_error {
            errors.push(format!("assistant client could not be created: {client_error}"));
        }

        let proxies = self.connector.proxy_settings();
        if !proxies.is_empty() && self.environment() == Some(Environment::Sandboxed) {
            let names: Vec<&str> = proxies.iter().map(|(name, _)| *name).collect();
            warnings.push(format!(
                "proxy variables are set in the hosted sandbox and are ignored: {}",
                names.join(", ")
            ));
        }
        if self.session.recovery().needs_remediation() {
            warnings.push(format!(
                "{} consecutive failures; consider /reset or /full-reset",
                self.session.recovery().get()
            ));
        }

        Readiness {
            ready: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Authenticated round trip; returns how many models the key can see.
    pub async fn test_connection(&self) -> Result<usize, SessionError> {
        let Some(driver) = &self.driver else {
            return Err(SessionError::NoThread);
        };
        driver.check_connection().await
    }

    pub fn environment_report(&self) -> Option<&EnvironmentReport> {
        self.connector.environment_report()
    }

    fn environment(&self) -> Option<Environment> {
        self.environment_report().map(|report| report.environment)
    }

    fn environment_label(&self) -> &'static str {
        match self.environment() {
            Some(environment) => environment.label(),
            None => "offline",
        }
    }
}
