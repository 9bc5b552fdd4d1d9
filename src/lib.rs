//! Line-oriented chat front end for a hosted assistant service.
//!
//! [`ChatApp`] is the host surface: it resolves credentials, connects through
//! a [`Connector`], and delegates turns to a `chat_session` driver. The binary
//! wraps it in a stdin REPL with the slash commands from [`commands`].

pub mod app;
pub mod commands;
pub mod config;
pub mod connector;
pub mod logging;

pub use app::{ChatApp, Readiness, SessionDiagnostics};
pub use commands::{parse_slash_command, SlashCommand};
pub use config::{Backend, HostConfig};
pub use connector::{Connector, HttpConnector, MockConnector};
