//! Credential resolution.
//!
//! Sources are consulted in a fixed order per field: values cached for the
//! running session, process environment, the secrets file, and finally an
//! interactive prompt. The first non-empty value wins.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SessionError;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const SECRETS_PATH_VAR: &str = "ASSISTANT_CHAT_SECRETS_PATH";
pub const DEFAULT_SECRETS_PATH: &str = ".assistant/secrets.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialField {
    ApiKey,
    AssistantId,
    Model,
}

impl CredentialField {
    pub const ALL: [Self; 3] = [Self::ApiKey, Self::AssistantId, Self::Model];

    /// Name used both as environment variable and secrets file key.
    pub fn key(self) -> &'static str {
        match self {
            Self::ApiKey => "OPENAI_API_KEY",
            Self::AssistantId => "ASSISTANT_ID",
            Self::Model => "OPENAI_API_MODEL",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ApiKey => "API key",
            Self::AssistantId => "assistant id",
            Self::Model => "model",
        }
    }

    pub fn is_secret(self) -> bool {
        matches!(self, Self::ApiKey)
    }
}

pub trait CredentialSource: Send {
    fn name(&self) -> &'static str;
    fn lookup(&mut self, field: CredentialField) -> Option<String>;
}

/// Values already resolved during this session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCache {
    values: BTreeMap<CredentialField, String>,
}

impl SessionCache {
    pub fn get(&self, field: CredentialField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn set(&mut self, field: CredentialField, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn store(&mut self, credentials: &ResolvedCredentials) {
        self.set(CredentialField::ApiKey, credentials.api_key.clone());
        self.set(CredentialField::AssistantId, credentials.assistant_id.clone());
        self.set(CredentialField::Model, credentials.model.clone());
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl CredentialSource for SessionCache {
    fn name(&self) -> &'static str {
        "session"
    }

    fn lookup(&mut self, field: CredentialField) -> Option<String> {
        self.get(field).map(str::to_owned)
    }
}

type VarLookup = Box<dyn Fn(&str) -> Option<String> + Send>;

pub struct EnvSource {
    lookup: VarLookup,
}

impl EnvSource {
    pub fn process() -> Self {
        Self {
            lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            lookup: Box::new(move |key| values.get(key).cloned()),
        }
    }
}

impl fmt::Debug for EnvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvSource").finish_non_exhaustive()
    }
}

impl CredentialSource for EnvSource {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn lookup(&mut self, field: CredentialField) -> Option<String> {
        (self.lookup)(field.key())
    }
}

/// Flat JSON object of string values, read lazily on first lookup.
#[derive(Debug, Clone)]
pub struct SecretsFile {
    path: PathBuf,
    values: Option<BTreeMap<String, String>>,
}

impl SecretsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: None,
        }
    }

    /// `ASSISTANT_CHAT_SECRETS_PATH` when set, otherwise `.assistant/secrets.json`.
    pub fn default_location() -> Self {
        let path = std::env::var(SECRETS_PATH_VAR)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_PATH));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn values(&mut self) -> &BTreeMap<String, String> {
        self.values.get_or_insert_with(|| load_secrets(&self.path))
    }
}

fn load_secrets(path: &Path) -> BTreeMap<String, String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            debug!(path = %path.display(), %error, "secrets file not readable");
            return BTreeMap::new();
        }
    };
    match serde_json::from_str::<BTreeMap<String, Value>>(&raw) {
        Ok(entries) => entries
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(text) => Some((key, text)),
                _ => None,
            })
            .collect(),
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring malformed secrets file");
            BTreeMap::new()
        }
    }
}

impl CredentialSource for SecretsFile {
    fn name(&self) -> &'static str {
        "secrets file"
    }

    fn lookup(&mut self, field: CredentialField) -> Option<String> {
        self.values().get(field.key()).cloned()
    }
}

/// Asks the user for a value; `None` means the user declined.
pub trait CredentialPrompt: Send {
    fn prompt(&mut self, field: CredentialField) -> Option<String>;
}

/// Prompts for the API key and assistant id only; the model has a default.
pub struct InteractiveSource<P> {
    prompt: P,
}

impl<P: CredentialPrompt> InteractiveSource<P> {
    pub fn new(prompt: P) -> Self {
        Self { prompt }
    }
}

impl<P: CredentialPrompt> CredentialSource for InteractiveSource<P> {
    fn name(&self) -> &'static str {
        "prompt"
    }

    fn lookup(&mut self, field: CredentialField) -> Option<String> {
        if field == CredentialField::Model {
            return None;
        }
        self.prompt.prompt(field)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub api_key: String,
    pub assistant_id: String,
    pub model: String,
    /// Which source supplied each field; defaults are recorded as "default".
    pub origins: BTreeMap<CredentialField, &'static str>,
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("api_key", &"<redacted>")
            .field("assistant_id", &self.assistant_id)
            .field("model", &self.model)
            .field("origins", &self.origins)
            .finish()
    }
}

#[derive(Default)]
pub struct CredentialResolver {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source after the ones already registered.
    pub fn source(mut self, source: impl CredentialSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn resolve(&mut self) -> Result<ResolvedCredentials, SessionError> {
        let mut values = BTreeMap::new();
        let mut origins = BTreeMap::new();
        let mut missing = Vec::new();

        for field in CredentialField::ALL {
            match self.lookup(field) {
                Some((value, origin)) => {
                    debug!(field = field.key(), source = origin, "resolved credential");
                    values.insert(field, value);
                    origins.insert(field, origin);
                }
                None if field == CredentialField::Model => {
                    values.insert(field, DEFAULT_MODEL.to_owned());
                    origins.insert(field, "default");
                }
                None => missing.push(field.key()),
            }
        }

        if !missing.is_empty() {
            return Err(SessionError::configuration_missing(missing));
        }

        let mut take = |field: CredentialField| values.remove(&field).unwrap_or_default();
        Ok(ResolvedCredentials {
            api_key: take(CredentialField::ApiKey),
            assistant_id: take(CredentialField::AssistantId),
            model: take(CredentialField::Model),
            origins,
        })
    }

    fn lookup(&mut self, field: CredentialField) -> Option<(String, &'static str)> {
        self.sources.iter_mut().find_map(|source| {
            let value = source.lookup(field)?;
            let value = value.trim();
            (!value.is_empty()).then(|| (value.to_owned(), source.name()))
        })
    }
}
