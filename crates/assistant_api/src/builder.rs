//! Client construction with environment-dependent fallback strategies.
//!
//! Unrestricted hosts build the client with every configured option. Hosted
//! sandboxes start from the minimal API-key-only client and, when that still
//! fails with a known construction defect, retry with legacy-compatible
//! transports. Every successful client gets the assistants protocol header.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use reqwest::{Client, Proxy};
use tracing::{error, info, warn};

use crate::client::AssistantClient;
use crate::config::AssistantApiConfig;
use crate::environment::{detect_environment, Environment, SystemProbe};
use crate::error::AssistantApiError;
use crate::headers::{ASSISTANTS_PROTOCOL_VERSION, HEADER_OPENAI_BETA};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructionStrategy {
    /// All configured options: proxy, timeout, organization/project headers.
    Standard,
    /// API key only.
    Minimal,
    /// Proxy-less low-level transports, tried in order.
    LegacyCompat,
}

impl ConstructionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Minimal => "minimal",
            Self::LegacyCompat => "legacy_compat",
        }
    }

    fn transports(self, config: &AssistantApiConfig) -> Vec<TransportSpec> {
        match self {
            Self::Standard => vec![TransportSpec::Standard {
                proxy: config.proxy.clone(),
                timeout: config.timeout,
            }],
            Self::Minimal => vec![TransportSpec::Minimal],
            Self::LegacyCompat => vec![TransportSpec::LegacyHttp1, TransportSpec::LegacyUnpooled],
        }
    }

    fn client_config(self, config: &AssistantApiConfig) -> AssistantApiConfig {
        match self {
            Self::Standard => config.clone(),
            Self::Minimal | Self::LegacyCompat => config.minimal(),
        }
    }
}

impl fmt::Display for ConstructionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered strategies tried for an environment.
pub fn strategy_plan(environment: Environment) -> &'static [ConstructionStrategy] {
    match environment {
        Environment::Unrestricted => &[ConstructionStrategy::Standard],
        Environment::Sandboxed => &[
            ConstructionStrategy::Minimal,
            ConstructionStrategy::LegacyCompat,
        ],
    }
}

/// Low-level HTTP transport recipe handed to a [`TransportFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpec {
    Standard {
        proxy: Option<String>,
        timeout: Option<Duration>,
    },
    Minimal,
    LegacyHttp1,
    LegacyUnpooled,
}

/// Turns a [`TransportSpec`] into a reqwest client or a failure message.
pub type TransportFactory = Arc<dyn Fn(&TransportSpec) -> Result<Client, String> + Send + Sync>;

/// Default factory backed by `reqwest::ClientBuilder`.
pub fn build_transport(spec: &TransportSpec) -> Result<Client, String> {
    let builder = match spec {
        TransportSpec::Standard { proxy, timeout } => {
            let mut builder = Client::builder();
            if let Some(proxy) = proxy.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
                let proxy_config = Proxy::all(proxy)
                    .map_err(|error| format!("invalid proxy '{proxy}': {error}"))?;
                builder = builder.proxy(proxy_config);
            }
            if let Some(timeout) = timeout {
                builder = builder.timeout(*timeout);
            }
            builder
        }
        TransportSpec::Minimal => Client::builder(),
        TransportSpec::LegacyHttp1 => Client::builder().no_proxy().http1_only(),
        TransportSpec::LegacyUnpooled => Client::builder().no_proxy().pool_max_idle_per_host(0),
    };

    builder.build().map_err(|error| error.to_string())
}

fn construction_defect_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)prox(y|ies)|builder error|unexpected keyword")
            .expect("construction defect regex must compile")
    })
}

/// Whether a construction failure belongs to the class the legacy strategy works around.
pub fn is_known_construction_defect(message: &str) -> bool {
    construction_defect_regex().is_match(message)
}

/// Produces an [`AssistantClient`] following the environment's strategy plan.
#[derive(Clone)]
pub struct ClientBuilder {
    config: AssistantApiConfig,
    environment: Option<Environment>,
    strategy: Option<ConstructionStrategy>,
    factory: TransportFactory,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.config.base_url)
            .field("environment", &self.environment)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    pub fn new(config: AssistantApiConfig) -> Self {
        Self {
            config,
            environment: None,
            strategy: None,
            factory: Arc::new(build_transport),
        }
    }

    /// Skips detection and uses the given environment's plan.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Forces a single strategy regardless of environment.
    pub fn strategy(mut self, strategy: ConstructionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn transport_factory(mut self, factory: TransportFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn plan(&self) -> Vec<ConstructionStrategy> {
        if let Some(strategy) = self.strategy {
            return vec![strategy];
        }
        let environment = self
            .environment
            .unwrap_or_else(|| detect_environment(&SystemProbe));
        strategy_plan(environment).to_vec()
    }

    pub fn build(self) -> Result<AssistantClient, AssistantApiError> {
        if self.config.api_key.trim().is_empty() {
            return Err(AssistantApiError::MissingApiKey);
        }

        let plan = self.plan();
        let mut original: Option<AssistantApiError> = None;
        let mut previous_message: Option<String> = None;

        for strategy in plan {
            if let Some(message) = previous_message.as_deref() {
                if !is_known_construction_defect(message) {
                    break;
                }
                info!(strategy = %strategy, "known construction defect; trying fallback strategy");
            }

            match self.construct(strategy) {
                Ok(mut client) => {
                    client.headers_mut().insert(
                        HEADER_OPENAI_BETA.to_owned(),
                        ASSISTANTS_PROTOCOL_VERSION.to_owned(),
                    );
                    info!(strategy = %strategy, "assistant client constructed");
                    return Ok(client);
                }
                Err(message) => {
                    warn!(strategy = %strategy, error = %message, "assistant client construction failed");
                    previous_message = Some(message.clone());
                    if original.is_none() {
                        original = Some(AssistantApiError::ClientConstruction { strategy, message });
                    }
                }
            }
        }

        let error = original.unwrap_or_else(|| {
            AssistantApiError::Unknown("no construction strategy available".to_owned())
        });
        error!(error = %error, "could not construct assistant client");
        Err(error)
    }

    fn construct(&self, strategy: ConstructionStrategy) -> Result<AssistantClient, String> {
        let mut last_message = None;
        for spec in strategy.transports(&self.config) {
            match (self.factory)(&spec) {
                Ok(http) => {
                    return Ok(AssistantClient::from_parts(
                        http,
                        strategy.client_config(&self.config),
                        strategy,
                    ))
                }
                Err(message) => {
                    warn!(transport = ?spec, error = %message, "transport allocation failed");
                    last_message = Some(message);
                }
            }
        }
        Err(last_message.unwrap_or_else(|| format!("{strategy} strategy has no transports")))
    }
}
