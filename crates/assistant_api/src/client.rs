use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::builder::{ClientBuilder, ConstructionStrategy};
use crate::config::AssistantApiConfig;
use crate::error::{parse_error_message, AssistantApiError};
use crate::headers::build_headers;
use crate::payload::{
    CreateMessageRequest, CreateRunRequest, MessageList, MessageRole, Model, ModelList, Run,
    Thread, ThreadMessage,
};
use crate::service::AssistantService;
use crate::url::endpoint;

/// Authenticated HTTP handle for the hosted assistant service.
///
/// Not meant to be shared between sessions: [`AssistantClient::headers_mut`]
/// mutates state every request reads.
#[derive(Debug)]
pub struct AssistantClient {
    http: Client,
    config: AssistantApiConfig,
    default_headers: BTreeMap<String, String>,
    strategy: ConstructionStrategy,
}

impl AssistantClient {
    /// Builds a client with the standard strategy.
    pub fn new(config: AssistantApiConfig) -> Result<Self, AssistantApiError> {
        ClientBuilder::new(config)
            .strategy(ConstructionStrategy::Standard)
            .build()
    }

    pub(crate) fn from_parts(
        http: Client,
        config: AssistantApiConfig,
        strategy: ConstructionStrategy,
    ) -> Self {
        Self {
            http,
            config,
            default_headers: BTreeMap::new(),
            strategy,
        }
    }

    pub fn config(&self) -> &AssistantApiConfig {
        &self.config
    }

    /// Strategy that produced this client.
    pub fn strategy(&self) -> ConstructionStrategy {
        self.strategy
    }

    pub fn default_headers(&self) -> &BTreeMap<String, String> {
        &self.default_headers
    }

    pub fn headers_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.default_headers
    }

    pub fn endpoint(&self, path: &str) -> String {
        endpoint(&self.config.base_url, path)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, AssistantApiError> {
        let headers = build_headers(&self.config, &self.default_headers)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| AssistantApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    AssistantApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(&self, method: Method, path: &str) -> Result<RequestBuilder, AssistantApiError> {
        let headers = self.build_headers()?;
        Ok(self.http.request(method, self.endpoint(path)).headers(headers))
    }

    async fn send<T>(&self, request: RequestBuilder, resource: &str) -> Result<T, AssistantApiError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(resource, status = status.as_u16(), "assistant service response");

        if status == StatusCode::NOT_FOUND {
            return Err(AssistantApiError::NotFound(resource.to_owned()));
        }
        if !status.is_success() {
            return Err(AssistantApiError::Status(
                status,
                parse_error_message(status, &body),
            ));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl AssistantService for AssistantClient {
    async fn create_thread(&self) -> Result<Thread, AssistantApiError> {
        let request = self
            .build_request(Method::POST, "threads")?
            .json(&serde_json::json!({}));
        self.send(request, "threads").await
    }

    async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread, AssistantApiError> {
        let path = format!("threads/{thread_id}");
        let request = self.build_request(Method::GET, &path)?;
        self.send(request, &path).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, AssistantApiError> {
        let path = format!("threads/{thread_id}/messages");
        let body = CreateMessageRequest {
            role,
            content: content.to_owned(),
        };
        let request = self.build_request(Method::POST, &path)?.json(&body);
        self.send(request, &path).await
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        model: Option<&str>,
    ) -> Result<Run, AssistantApiError> {
        let path = format!("threads/{thread_id}/runs");
        let body = CreateRunRequest::new(assistant_id, model);
        let request = self.build_request(Method::POST, &path)?.json(&body);
        self.send(request, &path).await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantApiError> {
        let path = format!("threads/{thread_id}/runs/{run_id}");
        let request = self.build_request(Method::GET, &path)?;
        self.send(request, &path).await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantApiError> {
        let path = format!("threads/{thread_id}/messages");
        let request = self
            .build_request(Method::GET, &path)?
            .query(&[("order", "desc")]);
        let list: MessageList = self.send(request, &path).await?;
        Ok(list.data)
    }

    async fn list_models(&self) -> Result<Vec<Model>, AssistantApiError> {
        let request = self.build_request(Method::GET, "models")?;
        let list: ModelList = self.send(request, "models").await?;
        Ok(list.data)
    }
}
