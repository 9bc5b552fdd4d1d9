use std::sync::Arc;

use assistant_api::environment::{detect_with_policy, proxy_settings, DetectionPolicy, SystemProbe};
use assistant_api::{
    AssistantApiConfig, AssistantApiError, AssistantService, ClientBuilder, EnvironmentReport,
};
use assistant_api_mock::MockAssistantService;
use chat_session::ResolvedCredentials;
use tracing::info;

use crate::config::HostConfig;

const USER_AGENT: &str = concat!("assistant_chat/", env!("CARGO_PKG_VERSION"));

/// Turns resolved credentials into a service handle.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        credentials: &ResolvedCredentials,
    ) -> Result<Arc<dyn AssistantService>, AssistantApiError>;

    fn environment_report(&self) -> Option<&EnvironmentReport> {
        None
    }

    /// Proxy variables present in the process environment.
    fn proxy_settings(&self) -> &[(&'static str, String)] {
        &[]
    }
}

/// Builds real HTTP clients through the environment-aware construction chain.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    config: HostConfig,
    report: EnvironmentReport,
    proxies: Vec<(&'static str, String)>,
}

impl HttpConnector {
    pub fn new(config: HostConfig, report: EnvironmentReport) -> Self {
        Self {
            config,
            report,
            proxies: Vec::new(),
        }
    }

    /// Detects the environment from the running process.
    pub fn from_process(config: HostConfig) -> Self {
        let probe = SystemProbe;
        let report = detect_with_policy(&probe, DetectionPolicy::default());
        info!(
            environment = %report.environment,
            forced = report.forced,
            signals = ?report.fired_signals().collect::<Vec<_>>(),
            "detected deployment environment"
        );
        Self {
            proxies: proxy_settings(&probe),
            ..Self::new(config, report)
        }
    }

    fn api_config(&self, credentials: &ResolvedCredentials) -> AssistantApiConfig {
        let mut api_config = AssistantApiConfig::new(credentials.api_key.clone())
            .with_base_url(&self.config.base_url)
            .with_timeout(self.config.request_timeout)
            .with_user_agent(USER_AGENT);
        if let Some(organization) = &self.config.organization {
            api_config = api_config.with_organization(organization);
        }
        if let Some(project) = &self.config.project {
            api_config = api_config.with_project(project);
        }
        if let Some(proxy) = &self.config.proxy {
            api_config = api_config.with_proxy(proxy);
        }
        api_config
    }
}

impl Connector for HttpConnector {
    fn connect(
        &self,
        credentials: &ResolvedCredentials,
    ) -> Result<Arc<dyn AssistantService>, AssistantApiError> {
        let client = ClientBuilder::new(self.api_config(credentials))
            .environment(self.report.environment)
            .build()?;
        info!(strategy = %client.strategy(), "assistant client ready");
        Ok(Arc::new(client))
    }

    fn environment_report(&self) -> Option<&EnvironmentReport> {
        Some(&self.report)
    }

    fn proxy_settings(&self) -> &[(&'static str, String)] {
        &self.proxies
    }
}

/// Hands out one shared in-memory service; used for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    service: Arc<MockAssistantService>,
}

impl MockConnector {
    pub fn new(service: Arc<MockAssistantService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<MockAssistantService> {
        &self.service
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        _credentials: &ResolvedCredentials,
    ) -> Result<Arc<dyn AssistantService>, AssistantApiError> {
        Ok(self.service.clone())
    }
}
