//! Deterministic in-memory implementation of the `assistant_api` service contract.
//!
//! This crate contains no transport logic. It simulates threads, messages, and
//! runs closely enough for session-level tests and offline local runs, with
//! hooks for injecting failures and server-side thread expiry.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use assistant_api::payload::RunError;
use assistant_api::{
    AssistantApiError, AssistantService, MessageRole, Model, Run, RunStatus, Thread, ThreadMessage,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

/// Stable backend identifier used for explicit startup selection.
pub const MOCK_BACKEND_ID: &str = "mock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    CreateThread,
    RetrieveThread,
    CreateMessage,
    CreateRun,
    RetrieveRun,
    ListMessages,
    ListModels,
}

#[derive(Debug, Clone)]
struct Fault {
    remaining: u32,
    status: StatusCode,
    message: String,
}

#[derive(Debug)]
struct MockRun {
    run: Run,
    pending: VecDeque<RunStatus>,
    reply_posted: bool,
}

#[derive(Debug, Default)]
struct MockThread {
    messages: Vec<ThreadMessage>,
    runs: BTreeMap<String, MockRun>,
}

#[derive(Debug)]
struct State {
    threads: BTreeMap<String, MockThread>,
    queued_thread_ids: VecDeque<String>,
    next_id: u64,
    run_script: Vec<RunStatus>,
    run_error: Option<RunError>,
    reply: Option<Value>,
    rejected_models: BTreeSet<String>,
    faults: HashMap<Operation, Fault>,
    calls: HashMap<Operation, usize>,
    run_models: Vec<Option<String>>,
    models: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            threads: BTreeMap::new(),
            queued_thread_ids: VecDeque::new(),
            next_id: 1,
            run_script: vec![RunStatus::Queued, RunStatus::InProgress, RunStatus::Completed],
            run_error: None,
            reply: None,
            rejected_models: BTreeSet::new(),
            faults: HashMap::new(),
            calls: HashMap::new(),
            run_models: Vec::new(),
            models: vec!["gpt-4o-mini".to_owned(), "gpt-4o".to_owned()],
        }
    }
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}_{}", self.next_id);
        self.next_id += 1;
        id
    }

    fn record_call(&mut self, operation: Operation) -> Result<(), AssistantApiError> {
        *self.calls.entry(operation).or_default() += 1;

        let Some(fault) = self.faults.get_mut(&operation) else {
            return Ok(());
        };
        if fault.remaining == 0 {
            return Ok(());
        }
        fault.remaining -= 1;
        Err(AssistantApiError::Status(fault.status, fault.message.clone()))
    }

    fn thread_mut(&mut self, thread_id: &str) -> Result<&mut MockThread, AssistantApiError> {
        self.threads
            .get_mut(thread_id)
            .ok_or_else(|| AssistantApiError::NotFound(format!("threads/{thread_id}")))
    }
}

/// In-memory assistant service used by tests and `ASSISTANT_CHAT_BACKEND=mock`.
#[derive(Debug, Default)]
pub struct MockAssistantService {
    state: Mutex<State>,
}

impl MockAssistantService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids handed out by `create_thread` before generated ones.
    #[must_use]
    pub fn with_thread_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock_unpoisoned(&self.state)
            .queued_thread_ids
            .extend(ids.into_iter().map(Into::into));
        self
    }

    /// Status sequence reported by successive `retrieve_run` calls of new runs.
    /// The last status repeats once the sequence is exhausted.
    pub fn script_runs(&self, statuses: Vec<RunStatus>) {
        lock_unpoisoned(&self.state).run_script = statuses;
    }

    /// Error detail attached to runs that end in a non-completed status.
    pub fn set_run_error(&self, code: &str, message: &str) {
        lock_unpoisoned(&self.state).run_error = Some(RunError {
            code: Some(code.to_owned()),
            message: Some(message.to_owned()),
        });
    }

    /// Raw `content` posted as the assistant reply when a run completes.
    pub fn set_reply_content(&self, content: Value) {
        lock_unpoisoned(&self.state).reply = Some(content);
    }

    pub fn reject_model(&self, model: &str) {
        lock_unpoisoned(&self.state)
            .rejected_models
            .insert(model.to_owned());
    }

    /// Fails the next `times` calls of `operation` with a transient 503.
    pub fn fail_next(&self, operation: Operation, times: u32) {
        self.fail_next_with(
            operation,
            times,
            StatusCode::SERVICE_UNAVAILABLE,
            "The server is overloaded",
        );
    }

    pub fn fail_next_with(&self, operation: Operation, times: u32, status: StatusCode, message: &str) {
        lock_unpoisoned(&self.state).faults.insert(
            operation,
            Fault {
                remaining: times,
                status,
                message: message.to_owned(),
            },
        );
    }

    /// Forgets a thread, as the service does when a thread expires.
    pub fn expire_thread(&self, thread_id: &str) -> bool {
        lock_unpoisoned(&self.state).threads.remove(thread_id).is_some()
    }

    /// Appends a message directly to a thread, bypassing runs.
    pub fn push_message(&self, thread_id: &str, role: MessageRole, content: Value) -> Option<String> {
        let mut state = lock_unpoisoned(&self.state);
        let id = state.next_id("msg");
        let thread = state.threads.get_mut(thread_id)?;
        thread.messages.push(ThreadMessage {
            id: id.clone(),
            role,
            content,
            run_id: None,
        });
        Some(id)
    }

    pub fn has_thread(&self, thread_id: &str) -> bool {
        lock_unpoisoned(&self.state).threads.contains_key(thread_id)
    }

    pub fn calls(&self, operation: Operation) -> usize {
        lock_unpoisoned(&self.state)
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// `model` argument of every `create_run` call, in order.
    pub fn run_models(&self) -> Vec<Option<String>> {
        lock_unpoisoned(&self.state).run_models.clone()
    }

    /// Messages of a thread in chronological order.
    pub fn messages(&self, thread_id: &str) -> Vec<ThreadMessage> {
        lock_unpoisoned(&self.state)
            .threads
            .get(thread_id)
            .map(|thread| thread.messages.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AssistantService for MockAssistantService {
    async fn create_thread(&self) -> Result<Thread, AssistantApiError> {
        let mut state = lock_unpoisoned(&self.state);
        state.record_call(Operation::CreateThread)?;

        let id = match state.queued_thread_ids.pop_front() {
            Some(id) => id,
            None => state.next_id("thread"),
        };
        state.threads.insert(id.clone(), MockThread::default());
        Ok(Thread {
            id,
            created_at: None,
        })
    }

    async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread, AssistantApiError> {
        let mut state = lock_unpoisoned(&self.state);
        state.record_call(Operation::RetrieveThread)?;
        state.thread_mut(thread_id)?;
        Ok(Thread {
            id: thread_id.to_owned(),
            created_at: None,
        })
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, AssistantApiError> {
        let mut state = lock_unpoisoned(&self.state);
        state.record_call(Operation::CreateMessage)?;

        let id = state.next_id("msg");
        let message = ThreadMessage {
            id,
            role,
            content: text_content(content),
            run_id: None,
        };
        state.thread_mut(thread_id)?.messages.push(message.clone());
        Ok(message)
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        model: Option<&str>,
    ) -> Result<Run, AssistantApiError> {
        let mut state = lock_unpoisoned(&self.state);
        state.record_call(Operation::CreateRun)?;
        state.run_models.push(model.map(str::to_owned));

        if let Some(model) = model.filter(|model| state.rejected_models.contains(*model)) {
            return Err(AssistantApiError::Status(
                StatusCode::BAD_REQUEST,
                format!("The requested model '{model}' does not exist."),
            ));
        }

        let id = state.next_id("run");
        let pending: VecDeque<RunStatus> = state.run_script.iter().copied().collect();
        let run = Run {
            id: id.clone(),
            thread_id: thread_id.to_owned(),
            status: RunStatus::Queued,
            assistant_id: Some(assistant_id.to_owned()),
            model: model.map(str::to_owned),
            last_error: None,
        };
        state.thread_mut(thread_id)?.runs.insert(
            id,
            MockRun {
                run: run.clone(),
                pending,
                reply_posted: false,
            },
        );
        Ok(run)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantApiError> {
        let mut state = lock_unpoisoned(&self.state);
        state.record_call(Operation::RetrieveRun)?;

        let run_error = state.run_error.clone();
        let reply = state.reply.clone();
        let reply_id = state.next_id("msg");
        let thread = state.thread_mut(thread_id)?;
        let mock_run = thread
            .runs
            .get_mut(run_id)
            .ok_or_else(|| AssistantApiError::NotFound(format!("threads/{thread_id}/runs/{run_id}")))?;

        if mock_run.pending.len() > 1 {
            if let Some(status) = mock_run.pending.pop_front() {
                mock_run.run.status = status;
            }
        } else if let Some(status) = mock_run.pending.front() {
            mock_run.run.status = *status;
        }

        let status = mock_run.run.status;
        if status.is_terminal() && status != RunStatus::Completed {
            mock_run.run.last_error = run_error;
        }

        let snapshot = mock_run.run.clone();
        if status == RunStatus::Completed && !mock_run.reply_posted {
            mock_run.reply_posted = true;
            let prompt = thread
                .messages
                .iter()
                .rev()
                .find(|message| message.role == MessageRole::User)
                .and_then(|message| message.content[0]["text"]["value"].as_str())
                .unwrap_or_default()
                .to_owned();
            thread.messages.push(ThreadMessage {
                id: reply_id,
                role: MessageRole::Assistant,
                content: reply.unwrap_or_else(|| text_content(&format!("Mock reply to: {prompt}"))),
                run_id: Some(run_id.to_owned()),
            });
        }

        Ok(snapshot)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantApiError> {
        let mut state = lock_unpoisoned(&self.state);
        state.record_call(Operation::ListMessages)?;
        let thread = state.thread_mut(thread_id)?;
        Ok(thread.messages.iter().rev().cloned().collect())
    }

    async fn list_models(&self) -> Result<Vec<Model>, AssistantApiError> {
        let mut state = lock_unpoisoned(&self.state);
        state.record_call(Operation::ListModels)?;
        Ok(state
            .models
            .iter()
            .map(|id| Model { id: id.clone() })
            .collect())
    }
}

/// Content in the shape the service uses for plain text messages.
pub fn text_content(text: &str) -> Value {
    json!([{
        "type": "text",
        "text": {"value": text, "annotations": []}
    }])
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_walks_scripted_statuses_and_posts_reply_once() {
        let service = MockAssistantService::new();
        let thread = service.create_thread().await.expect("thread");
        service
            .create_message(&thread.id, MessageRole::User, "hello")
            .await
            .expect("message");
        let run = service
            .create_run(&thread.id, "asst_1", None)
            .await
            .expect("run");

        let mut observed = Vec::new();
        for _ in 0..4 {
            observed.push(
                service
                    .retrieve_run(&thread.id, &run.id)
                    .await
                    .expect("poll")
                    .status,
            );
        }

        assert_eq!(
            observed,
            vec![
                RunStatus::Queued,
                RunStatus::InProgress,
                RunStatus::Completed,
                RunStatus::Completed,
            ]
        );
        let messages = service.list_messages(&thread.id).await.expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::Assistant);
        assert_eq!(messages[0].content[0]["text"]["value"], "Mock reply to: hello");
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let service = MockAssistantService::new();
        service.fail_next(Operation::CreateThread, 2);

        assert!(service.create_thread().await.is_err());
        assert!(service.create_thread().await.is_err());
        assert!(service.create_thread().await.is_ok());
        assert_eq!(service.calls(Operation::CreateThread), 3);
    }

    #[tokio::test]
    async fn expired_thread_is_not_found() {
        let service = MockAssistantService::new().with_thread_ids(["T1"]);
        let thread = service.create_thread().await.expect("thread");
        assert_eq!(thread.id, "T1");

        assert!(service.expire_thread("T1"));
        let error = service.retrieve_thread("T1").await.expect_err("expired");
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn rejected_model_fails_run_creation() {
        let service = MockAssistantService::new();
        service.reject_model("gpt-legacy");
        let thread = service.create_thread().await.expect("thread");

        let error = service
            .create_run(&thread.id, "asst_1", Some("gpt-legacy"))
            .await
            .expect_err("model rejected");
        assert!(error.to_string().contains("gpt-legacy"));

        service
            .create_run(&thread.id, "asst_1", None)
            .await
            .expect("default model run");
        assert_eq!(
            service.run_models(),
            vec![Some("gpt-legacy".to_owned()), None]
        );
    }
}
