use std::collections::HashSet;

use assistant_api::RunStatus;

use crate::error::SessionError;

/// Consecutive failures after which the host offers remediation guidance.
pub const REMEDIATION_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Service-side message id; only assistant replies carry one.
    pub external_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            external_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            external_id: Some(external_id.into()),
        }
    }
}

/// Failed attempts since the last fully successful turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryCounter(u32);

impl RecoveryCounter {
    pub fn get(self) -> u32 {
        self.0
    }

    pub fn increment(&mut self) -> u32 {
        self.0 = self.0.saturating_add(1);
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn needs_remediation(self) -> bool {
        self.0 >= REMEDIATION_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    ThreadCreating,
    Ready,
    Sending,
    RunPolling,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::ThreadCreating => "creating thread",
            Self::Ready => "ready",
            Self::Sending => "sending",
            Self::RunPolling => "waiting for run",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    RunFailed(RunStatus),
    Errored,
}

/// Per-user conversation state.
///
/// The local transcript mirrors the remote thread. Assistant replies are
/// appended at most once per service message id, which is what lets
/// reply extraction tell new replies from ones already shown.
#[derive(Debug, Clone, Default)]
pub struct Session {
    thread_id: Option<String>,
    messages: Vec<ChatMessage>,
    recovery: RecoveryCounter,
    phase: SessionPhase,
    last_outcome: Option<TurnOutcome>,
    last_error: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn set_thread_id(&mut self, thread_id: impl Into<String>) {
        self.thread_id = Some(thread_id.into());
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    /// Returns `false` when a reply with the same external id is already present.
    pub fn append_assistant(&mut self, message: ChatMessage) -> bool {
        if let Some(id) = message.external_id.as_deref() {
            if self.known_assistant_ids().contains(id) {
                return false;
            }
        }
        self.messages.push(message);
        true
    }

    pub fn known_assistant_ids(&self) -> HashSet<&str> {
        known_assistant_ids(&self.messages)
    }

    pub fn recovery(&self) -> RecoveryCounter {
        self.recovery
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
    }

    pub fn last_outcome(&self) -> Option<TurnOutcome> {
        self.last_outcome
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn record_success(&mut self) {
        self.recovery.reset();
        self.last_outcome = Some(TurnOutcome::Completed);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: &SessionError) -> u32 {
        self.last_outcome = Some(match error.run_status() {
            Some(status) => TurnOutcome::RunFailed(status),
            None => TurnOutcome::Errored,
        });
        self.last_error = Some(error.to_string());
        self.recovery.increment()
    }

    /// Drops the thread, the transcript, and the failure count.
    pub fn reset_conversation(&mut self) {
        self.thread_id = None;
        self.messages.clear();
        self.recovery.reset();
        self.phase = SessionPhase::Uninitialized;
        self.last_outcome = None;
    }

    pub fn clear_error(&mut self) {
        self.recovery.reset();
        self.last_error = None;
    }

    pub fn full_reset(&mut self) {
        *self = Self::default();
    }
}

pub(crate) fn known_assistant_ids(messages: &[ChatMessage]) -> HashSet<&str> {
    messages
        .iter()
        .filter(|message| message.role == Role::Assistant)
        .filter_map(|message| message.external_id.as_deref())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_reply_is_appended_once_per_external_id() {
        let mut session = Session::new();
        session.push_user("hola");

        assert!(session.append_assistant(ChatMessage::assistant("hi", "msg_2")));
        assert!(!session.append_assistant(ChatMessage::assistant("hi again", "msg_2")));
        assert!(session.append_assistant(ChatMessage::assistant("next", "msg_4")));

        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.known_assistant_ids(), HashSet::from(["msg_2", "msg_4"]));
    }

    #[test]
    fn recovery_counter_requests_remediation_after_two_failures() {
        let mut session = Session::new();
        session.record_failure(&SessionError::NoAssistantReply);
        assert!(!session.recovery().needs_remediation());

        session.record_failure(&SessionError::RunTerminalFailure {
            run_id: "run_1".to_owned(),
            status: RunStatus::Failed,
            detail: "server_error".to_owned(),
        });
        assert!(session.recovery().needs_remediation());
        assert_eq!(
            session.last_outcome(),
            Some(TurnOutcome::RunFailed(RunStatus::Failed))
        );

        session.record_success();
        assert_eq!(session.recovery().get(), 0);
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn reset_conversation_keeps_last_error_for_diagnostics() {
        let mut session = Session::new();
        session.set_thread_id("T1");
        session.push_user("hola");
        session.record_failure(&SessionError::NoThread);

        session.reset_conversation();
        assert_eq!(session.thread_id(), None);
        assert!(session.messages().is_empty());
        assert_eq!(session.recovery().get(), 0);
        assert!(session.last_error().is_some());

        session.full_reset();
        assert_eq!(session.last_error(), None);
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
    }
}
