//! Turn orchestration against an [`AssistantService`].
//!
//! One turn is: verify the thread, post the prompt, start a run, poll it to a
//! terminal status, then pull the newest assistant reply not yet shown. Each
//! network step is retried on its own so a failed run creation never posts
//! the user's message a second time.

use std::sync::Arc;
use std::time::Duration;

use assistant_api::{
    with_retry, with_retry_if, AssistantApiError, AssistantService, MessageRole, RetryPolicy, Run,
    RunStatus,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::extract::{extract_text, select_new_assistant_message};
use crate::session::{known_assistant_ids, ChatMessage, Session, SessionPhase};

pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_STEP_RETRIES: u32 = 2;

/// Interval schedule for run polling.
///
/// The interval only grows after a failed poll; healthy polling keeps the
/// initial cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSchedule {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub error_growth: f64,
    /// Added to the deadline once, when a poll fails past half of it.
    pub deadline_extension: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(1500),
            max_interval: Duration::from_secs(5),
            error_growth: 1.5,
            deadline_extension: Duration::from_secs(10),
        }
    }
}

impl PollSchedule {
    pub fn after_error(&self, interval: Duration) -> Duration {
        interval.mul_f64(self.error_growth).min(self.max_interval)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    pub step_retry: RetryPolicy,
    pub run_timeout: Duration,
    pub poll: PollSchedule,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            step_retry: RetryPolicy::new(DEFAULT_STEP_RETRIES, Duration::from_secs(1)),
            run_timeout: DEFAULT_RUN_TIMEOUT,
            poll: PollSchedule::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadRepair {
    Intact,
    Replaced {
        previous_thread_id: String,
        new_thread_id: String,
    },
}

pub struct SessionDriver {
    service: Arc<dyn AssistantService>,
    assistant_id: String,
    model: Option<String>,
    options: DriverOptions,
}

impl std::fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver")
            .field("assistant_id", &self.assistant_id)
            .field("model", &self.model)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SessionDriver {
    pub fn new(service: Arc<dyn AssistantService>, assistant_id: impl Into<String>) -> Self {
        Self {
            service,
            assistant_id: assistant_id.into(),
            model: None,
            options: DriverOptions::default(),
        }
    }

    /// Model override sent with each run. Blank values leave the assistant default.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn service(&self) -> &Arc<dyn AssistantService> {
        &self.service
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub async fn create_thread(&self) -> Result<String, SessionError> {
        let thread = with_retry("create_thread", &self.options.step_retry, || {
            self.service.create_thread()
        })
        .await
        .map_err(SessionError::from_retry)?;
        info!(thread_id = %thread.id, "created conversation thread");
        Ok(thread.id)
    }

    /// Makes sure `session` has a live thread and moves it to `Ready`.
    pub async fn initialize(&self, session: &mut Session) -> Result<(), SessionError> {
        let result = match session.thread_id().map(str::to_owned) {
            Some(thread_id) => self.repair_thread(&thread_id).await.map(|repair| {
                if let ThreadRepair::Replaced { new_thread_id, .. } = repair {
                    session.set_thread_id(new_thread_id);
                }
            }),
            None => {
                session.set_phase(SessionPhase::ThreadCreating);
                self.create_thread()
                    .await
                    .map(|thread_id| session.set_thread_id(thread_id))
            }
        };

        match result {
            Ok(()) => {
                session.set_phase(SessionPhase::Ready);
                Ok(())
            }
            Err(error) => {
                session.set_phase(SessionPhase::Uninitialized);
                session.record_failure(&error);
                Err(error)
            }
        }
    }

    /// Checks that `thread_id` still exists and creates a replacement if not.
    ///
    /// Transient lookup failures are retried first; any failure that remains
    /// is treated as a lost thread.
    pub async fn repair_thread(&self, thread_id: &str) -> Result<ThreadRepair, SessionError> {
        let lookup = with_retry_if(
            "retrieve_thread",
            &self.options.step_retry,
            AssistantApiError::is_transient,
            || self.service.retrieve_thread(thread_id),
        )
        .await;

        match lookup {
            Ok(_) => {
                debug!(thread_id, "thread is intact");
                Ok(ThreadRepair::Intact)
            }
            Err(failure) => {
                warn!(
                    thread_id,
                    error = %failure.last_error,
                    "thread is no longer usable; creating a replacement"
                );
                let new_thread_id = self.create_thread().await?;
                info!(
                    previous_thread_id = thread_id,
                    new_thread_id = %new_thread_id,
                    "replaced conversation thread"
                );
                Ok(ThreadRepair::Replaced {
                    previous_thread_id: thread_id.to_owned(),
                    new_thread_id,
                })
            }
        }
    }

    /// Posts `prompt` to the thread and starts a run.
    ///
    /// When a model override is configured and the run cannot be created with
    /// it, one more run is requested without the override.
    pub async fn send_and_run(&self, thread_id: &str, prompt: &str) -> Result<Run, SessionError> {
        with_retry("create_message", &self.options.step_retry, || {
            self.service
                .create_message(thread_id, MessageRole::User, prompt)
        })
        .await
        .map_err(SessionError::from_retry)?;

        let run = match self.model.as_deref() {
            Some(model) => {
                let with_model = with_retry_if(
                    "create_run",
                    &self.options.step_retry,
                    AssistantApiError::is_transient,
                    || {
                        self.service
                            .create_run(thread_id, &self.assistant_id, Some(model))
                    },
                )
                .await;
                match with_model {
                    Ok(run) => run,
                    Err(failure) => {
                        warn!(
                            model,
                            error = %failure.last_error,
                            "run creation with model override failed; retrying with assistant default"
                        );
                        self.create_run(thread_id, None).await?
                    }
                }
            }
            None => self.create_run(thread_id, None).await?,
        };

        ensure_same_thread(&run, thread_id)?;
        debug!(run_id = %run.id, thread_id, "run started");
        Ok(run)
    }

    async fn create_run(&self, thread_id: &str, model: Option<&str>) -> Result<Run, SessionError> {
        with_retry("create_run", &self.options.step_retry, || {
            self.service
                .create_run(thread_id, &self.assistant_id, model)
        })
        .await
        .map_err(SessionError::from_retry)
    }

    /// Polls the run until it reaches a terminal status or the deadline passes.
    ///
    /// The returned run is terminal; its status may still be a failure.
    /// A status request still pending at the deadline also ends in a timeout.
    pub async fn await_run(
        &self,
        thread_id: &str,
        run_id: &str,
        timeout: Duration,
    ) -> Result<Run, SessionError> {
        let schedule = self.options.poll;
        let started = Instant::now();
        let mut deadline = timeout;
        let mut extended = false;
        let mut interval = schedule.initial_interval;

        loop {
            let elapsed = started.elapsed();
            if elapsed > deadline {
                error!(run_id, thread_id, ?elapsed, ?deadline, "run polling timed out");
                return Err(SessionError::TimeoutExceeded {
                    run_id: run_id.to_owned(),
                    elapsed,
                    timeout: deadline,
                });
            }

            let remaining = deadline.saturating_sub(elapsed);
            let polled =
                tokio::time::timeout(remaining, self.service.retrieve_run(thread_id, run_id)).await;
            let Ok(polled) = polled else {
                let elapsed = started.elapsed();
                error!(run_id, thread_id, ?elapsed, ?deadline, "run status request stalled past deadline");
                return Err(SessionError::TimeoutExceeded {
                    run_id: run_id.to_owned(),
                    elapsed,
                    timeout: deadline,
                });
            };

            match polled {
                Ok(run) => {
                    ensure_same_thread(&run, thread_id)?;
                    if run.status.is_terminal() {
                        debug!(run_id, status = %run.status, ?elapsed, "run reached terminal status");
                        return Ok(run);
                    }
                    debug!(run_id, status = %run.status, "run still active");
                }
                Err(poll_error) => {
                    interval = schedule.after_error(interval);
                    warn!(
                        run_id,
                        error = %poll_error,
                        next_poll_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
                        "run status poll failed"
                    );
                    if !extended && elapsed > deadline / 2 {
                        deadline += schedule.deadline_extension;
                        extended = true;
                        info!(run_id, ?deadline, "extended run deadline after poll failure");
                    }
                }
            }

            tokio::time::sleep(interval).await;
        }
    }

    /// Newest assistant reply on the thread that is not already in `known`.
    pub async fn extract_latest_assistant_message(
        &self,
        thread_id: &str,
        known: &[ChatMessage],
    ) -> Result<Option<ChatMessage>, SessionError> {
        let messages = with_retry("list_messages", &self.options.step_retry, || {
            self.service.list_messages(thread_id)
        })
        .await
        .map_err(SessionError::from_retry)?;

        let known_ids = known_assistant_ids(known);
        let Some(message) = select_new_assistant_message(&messages, &known_ids) else {
            debug!(thread_id, listed = messages.len(), "no new assistant reply");
            return Ok(None);
        };
        Ok(Some(ChatMessage::assistant(
            extract_text(&message.content),
            message.id.clone(),
        )))
    }

    /// Runs one full turn for `prompt` and returns the reply text.
    ///
    /// The session's recovery counter is reset on success and incremented on
    /// every failure; the phase is back to `Ready` either way once a thread
    /// exists.
    pub async fn submit_prompt(
        &self,
        session: &mut Session,
        prompt: &str,
    ) -> Result<String, SessionError> {
        let prompt = prompt.trim();
        // Rejected locally; nothing reached the service, so no failure is recorded.
        if prompt.is_empty() {
            return Err(SessionError::EmptyPrompt);
        }

        let result = self.run_turn(session, prompt).await;
        match &result {
            Ok(_) => session.record_success(),
            Err(turn_error) => {
                let failures = session.record_failure(turn_error);
                error!(error = %turn_error, failures, "turn failed");
            }
        }
        if session.thread_id().is_some() {
            session.set_phase(SessionPhase::Ready);
        }
        result
    }

    async fn run_turn(&self, session: &mut Session, prompt: &str) -> Result<String, SessionError> {
        let Some(thread_id) = session.thread_id().map(str::to_owned) else {
            return Err(SessionError::NoThread);
        };

        let thread_id = match self.repair_thread(&thread_id).await? {
            ThreadRepair::Intact => thread_id,
            ThreadRepair::Replaced { new_thread_id, .. } => {
                session.set_thread_id(new_thread_id.clone());
                new_thread_id
            }
        };

        session.push_user(prompt);
        session.set_phase(SessionPhase::Sending);
        let run = self.send_and_run(&thread_id, prompt).await?;

        session.set_phase(SessionPhase::RunPolling);
        let run = self
            .await_run(&thread_id, &run.id, self.options.run_timeout)
            .await?;
        if run.status != RunStatus::Completed {
            return Err(SessionError::RunTerminalFailure {
                detail: run
                    .last_error
                    .as_ref()
                    .map(|run_error| run_error.describe())
                    .unwrap_or_else(|| "no error detail provided".to_owned()),
                run_id: run.id,
                status: run.status,
            });
        }

        let reply = self
            .extract_latest_assistant_message(&thread_id, session.messages())
            .await?
            .ok_or(SessionError::NoAssistantReply)?;
        let text = reply.content.clone();
        session.append_assistant(reply);
        Ok(text)
    }

    /// Lists models as a cheap authenticated round trip.
    pub async fn check_connection(&self) -> Result<usize, SessionError> {
        let models = with_retry_if(
            "list_models",
            &self.options.step_retry,
            AssistantApiError::is_transient,
            || self.service.list_models(),
        )
        .await
        .map_err(SessionError::from_retry)?;
        Ok(models.len())
    }
}

fn ensure_same_thread(run: &Run, thread_id: &str) -> Result<(), SessionError> {
    if run.thread_id == thread_id {
        return Ok(());
    }
    Err(SessionError::StaleRun {
        run_id: run.id.clone(),
        thread_id: thread_id.to_owned(),
        run_thread_id: run.thread_id.clone(),
    })
}
