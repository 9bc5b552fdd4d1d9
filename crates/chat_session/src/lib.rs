//! Conversation session management on top of `assistant_api`.
//!
//! [`Session`] holds per-user state; [`SessionDriver`] runs turns against any
//! [`assistant_api::AssistantService`], repairing lost threads and bounding
//! run polling; [`credentials`] resolves the API key, assistant id, and model
//! from layered sources.

pub mod credentials;
pub mod driver;
pub mod error;
pub mod extract;
pub mod session;

pub use credentials::{
    CredentialField, CredentialPrompt, CredentialResolver, CredentialSource, EnvSource,
    InteractiveSource, ResolvedCredentials, SecretsFile, SessionCache, DEFAULT_MODEL,
};
pub use driver::{DriverOptions, PollSchedule, SessionDriver, ThreadRepair};
pub use error::SessionError;
pub use extract::{extract_text, select_new_assistant_message, UNPARSEABLE_MESSAGE_SENTINEL};
pub use session::{ChatMessage, RecoveryCounter, Role, Session, SessionPhase, TurnOutcome};
