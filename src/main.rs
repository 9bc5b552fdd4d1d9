use std::io::{self, BufRead, Write};
use std::sync::Arc;

use assistant_chat::commands::HELP_TEXT;
use assistant_chat::config::{Backend, HostConfig};
use assistant_chat::logging::init_logging;
use assistant_chat::{
    parse_slash_command, ChatApp, Connector, HttpConnector, MockConnector, SlashCommand,
};
use chat_session::{
    CredentialField, CredentialPrompt, CredentialResolver, EnvSource, InteractiveSource,
    SecretsFile, SessionError,
};

struct StdinPrompt;

impl CredentialPrompt for StdinPrompt {
    fn prompt(&mut self, field: CredentialField) -> Option<String> {
        print!("Enter the {} ({}): ", field.label(), field.key());
        io::stdout().flush().ok()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).ok()?;
        let value = line.trim();
        (!value.is_empty()).then(|| value.to_owned())
    }
}

fn resolver_for(app: &ChatApp, backend: Backend) -> CredentialResolver {
    let resolver = CredentialResolver::new()
        .source(app.credential_cache())
        .source(EnvSource::process())
        .source(SecretsFile::default_location());
    match backend {
        Backend::Http => resolver.source(InteractiveSource::new(StdinPrompt)),
        Backend::Mock => resolver.source(EnvSource::from_pairs([
            (CredentialField::ApiKey.key(), "sk-mock"),
            (CredentialField::AssistantId.key(), "asst_mock"),
        ])),
    }
}

fn report_error(app: &ChatApp, error: &SessionError) {
    println!("error: {error}");
    if let Some(hint) = error.remediation_hint() {
        println!("hint: {hint}");
    }
    if app.session_diagnostics().show_remediation {
        println!("Several attempts have failed. Try /reset for a new conversation or /full-reset to start over.");
    }
}

fn print_diagnostics(app: &ChatApp) {
    let diagnostics = app.session_diagnostics();
    println!("connected:         {}", diagnostics.connected);
    println!("environment:       {}", diagnostics.environment);
    println!("phase:             {}", diagnostics.phase.as_str());
    println!(
        "thread:            {}",
        diagnostics.thread_id.as_deref().unwrap_or("-")
    );
    println!("recovery attempts: {}", diagnostics.recovery_attempts);
    if let Some(last_error) = &diagnostics.last_error {
        println!("last error:        {last_error}");
    }
    if let Some(report) = app.environment_report() {
        let signals: Vec<&str> = report.fired_signals().collect();
        println!(
            "detection:         {} (signals: {})",
            if report.forced { "forced" } else { "detected" },
            if signals.is_empty() {
                "none".to_owned()
            } else {
                signals.join(", ")
            }
        );
    }

    let readiness = app.readiness();
    println!("ready:             {}", readiness.ready);
    for error in &readiness.errors {
        println!("  error:   {error}");
    }
    for warning in &readiness.warnings {
        println!("  warning: {warning}");
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    init_logging();

    let config = HostConfig::from_env().map_err(io::Error::other)?;
    let backend = config.backend;
    let connector: Arc<dyn Connector> = match backend {
        Backend::Http => Arc::new(HttpConnector::from_process(config)),
        Backend::Mock => Arc::new(MockConnector::default()),
    };
    let mut app = ChatApp::new(connector);

    println!("assistant chat ({} backend). Type /help for commands.", backend.id());
    if let Err(error) = app.initialize_session(resolver_for(&app, backend)).await {
        report_error(&app, &error);
    }

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match parse_slash_command(input) {
            Some(SlashCommand::Help) => println!("{HELP_TEXT}"),
            Some(SlashCommand::Diagnostics) => print_diagnostics(&app),
            Some(SlashCommand::Recover) => {
                let resolver = resolver_for(&app, backend);
                match app.force_recovery(resolver).await {
                    Ok(()) => println!("session recovered"),
                    Err(error) => report_error(&app, &error),
                }
            }
            Some(SlashCommand::Reset) => match app.reset_conversation().await {
                Ok(()) => println!("started a new conversation"),
                Err(error) => report_error(&app, &error),
            },
            Some(SlashCommand::FullReset) => {
                app.full_reset();
                println!("session cleared; use /recover to connect again");
            }
            Some(SlashCommand::Ping) => match app.test_connection().await {
                Ok(models) => println!("connection ok ({models} models available)"),
                Err(error) => report_error(&app, &error),
            },
            Some(SlashCommand::Quit) => break,
            Some(SlashCommand::Unknown(command)) => {
                println!("unknown command {command}; type /help");
            }
            None => match app.submit_prompt(input).await {
                Ok(reply) => println!("{reply}"),
                Err(error) => report_error(&app, &error),
            },
        }
    }

    Ok(())
}
