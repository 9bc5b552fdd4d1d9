use async_trait::async_trait;

use crate::error::AssistantApiError;
use crate::payload::{MessageRole, Model, Run, Thread, ThreadMessage};

/// Operations the conversation core consumes from the hosted assistant service.
///
/// Implemented by [`crate::AssistantClient`] for the real HTTP surface and by
/// in-memory doubles for tests and offline runs.
#[async_trait]
pub trait AssistantService: Send + Sync {
    async fn create_thread(&self) -> Result<Thread, AssistantApiError>;

    /// Fails with [`AssistantApiError::NotFound`] when the service no longer knows the thread.
    async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread, AssistantApiError>;

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, AssistantApiError>;

    /// `model` is a best-effort override of the assistant's configured model.
    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        model: Option<&str>,
    ) -> Result<Run, AssistantApiError>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantApiError>;

    /// Messages ordered newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantApiError>;

    async fn list_models(&self) -> Result<Vec<Model>, AssistantApiError>;
}
