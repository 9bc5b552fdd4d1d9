use std::fs;

use chat_session::credentials::CredentialField;
use chat_session::{
    CredentialPrompt, CredentialResolver, EnvSource, InteractiveSource, SecretsFile, SessionCache,
    SessionError, DEFAULT_MODEL,
};
use tempfile::TempDir;

struct NeverAsked;

impl CredentialPrompt for NeverAsked {
    fn prompt(&mut self, field: CredentialField) -> Option<String> {
        panic!("prompted for {field:?} although a file value exists");
    }
}

struct Declines;

impl CredentialPrompt for Declines {
    fn prompt(&mut self, _field: CredentialField) -> Option<String> {
        None
    }
}

fn secrets_dir(contents: &str) -> (TempDir, SecretsFile) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("secrets.json");
    fs::write(&path, contents).expect("write secrets");
    (dir, SecretsFile::new(path))
}

#[test]
fn secrets_file_fills_fields_missing_from_environment() {
    let (_dir, secrets) = secrets_dir(
        r#"{"OPENAI_API_KEY": "sk-file", "ASSISTANT_ID": "asst_file", "OPENAI_API_MODEL": "gpt-4o"}"#,
    );

    let resolved = CredentialResolver::new()
        .source(SessionCache::default())
        .source(EnvSource::from_pairs([("ASSISTANT_ID", "asst_env")]))
        .source(secrets)
        .source(InteractiveSource::new(NeverAsked))
        .resolve()
        .expect("credentials");

    assert_eq!(resolved.api_key, "sk-file");
    assert_eq!(resolved.assistant_id, "asst_env");
    assert_eq!(resolved.model, "gpt-4o");
    assert_eq!(resolved.origins[&CredentialField::ApiKey], "secrets file");
    assert_eq!(resolved.origins[&CredentialField::AssistantId], "environment");
}

#[test]
fn malformed_secrets_file_is_ignored() {
    let (_dir, secrets) = secrets_dir("OPENAI_API_KEY = sk-toml");

    let error = CredentialResolver::new()
        .source(secrets)
        .source(InteractiveSource::new(Declines))
        .resolve()
        .expect_err("nothing usable");

    assert!(matches!(error, SessionError::ConfigurationMissing { .. }));
}

#[test]
fn absent_secrets_file_falls_through() {
    let dir = tempfile::tempdir().expect("temp dir");
    let resolved = CredentialResolver::new()
        .source(SecretsFile::new(dir.path().join("missing.json")))
        .source(EnvSource::from_pairs([
            ("OPENAI_API_KEY", "sk-env"),
            ("ASSISTANT_ID", "asst_env"),
        ]))
        .resolve()
        .expect("credentials");

    assert_eq!(resolved.model, DEFAULT_MODEL);
}

#[test]
fn cached_credentials_short_circuit_later_sources() {
    let mut cache = SessionCache::default();
    let first = CredentialResolver::new()
        .source(EnvSource::from_pairs([
            ("OPENAI_API_KEY", "sk-env"),
            ("ASSISTANT_ID", "asst_env"),
        ]))
        .resolve()
        .expect("credentials");
    cache.store(&first);

    let second = CredentialResolver::new()
        .source(cache.clone())
        .source(InteractiveSource::new(NeverAsked))
        .resolve()
        .expect("cached credentials");

    assert_eq!(second.api_key, "sk-env");
    assert_eq!(second.origins[&CredentialField::Model], "session");

    cache.clear();
    assert!(cache.is_empty());
}
