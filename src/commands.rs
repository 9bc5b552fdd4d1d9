#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Diagnostics,
    Recover,
    Reset,
    FullReset,
    Ping,
    Quit,
    Unknown(String),
}

pub const HELP_TEXT: &str = "\
/help        show this help
/diag        show session diagnostics and readiness
/recover     rebuild the client and repair the conversation thread
/reset       start a new conversation
/full-reset  clear all session state, credentials included
/ping        check the connection to the assistant service
/quit        exit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let command = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .to_string();

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/diag" => SlashCommand::Diagnostics,
        "/recover" => SlashCommand::Recover,
        "/reset" => SlashCommand::Reset,
        "/full-reset" => SlashCommand::FullReset,
        "/ping" => SlashCommand::Ping,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}
