//! Credential resolution for integrations.
//!
//! The engine never reads keys itself; it asks an injected
//! [`CredentialResolver`]. Integration ids are looked up under several name
//! variants, in order:
//!
//! 1. the exact id (`myOpenAI`)
//! 2. the id prefixed with a backend kind (`openai.myOpenAI`)
//! 3. the generic id of a backend kind contained in the id (`openai`)

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EnrichError, Result};

/// Kind of backend a credential unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    OpenAi,
    Anthropic,
    Ollama,
    Mock,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [Self::OpenAi, Self::Anthropic, Self::Ollama, Self::Mock];

    /// Generic integration id for this kind.
    pub fn id(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.id() == lower)
            .ok_or_else(|| format!("unknown backend '{}'", s))
    }
}

/// A resolved backend and its secret.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Backend that serves requests made with this credential.
    pub backend: BackendKind,
    /// Secret sent to the backend; empty for keyless backends.
    #[serde(default)]
    pub api_key: String,
    /// Overrides the backend's default endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Credential {
    /// Credential for `backend` at its default endpoint.
    pub fn new(backend: BackendKind, api_key: impl Into<String>) -> Self {
        Self {
            backend,
            api_key: api_key.into(),
            base_url: None,
        }
    }

    /// Point the backend at another endpoint, e.g. a proxy or remote Ollama host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("backend", &self.backend)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Source of credentials for integration ids.
pub trait CredentialResolver: Send + Sync {
    fn has_credential(&self, integration_name: &str) -> bool {
        self.resolve(integration_name).is_some()
    }

    fn resolve(&self, integration_name: &str) -> Option<Credential>;
}

/// Candidate store keys for an integration id, most specific first.
pub fn lookup_keys(integration_name: &str) -> Vec<String> {
    let mut keys = vec![integration_name.to_string()];
    for kind in BackendKind::ALL {
        keys.push(format!("{}.{}", kind.id(), integration_name));
    }
    let lower = integration_name.to_ascii_lowercase();
    let starts = word_starts(integration_name);
    for kind in BackendKind::ALL {
        if starts.iter().any(|&at| lower[at..].starts_with(kind.id())) {
            keys.push(kind.id().to_string());
        }
    }
    keys
}

/// Byte offsets where a word begins: the start, after a separator, or at a
/// lower-to-upper case change (`myOpenAI` -> 0, 2, 6).
fn word_starts(name: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut prev: Option<char> = None;
    for (at, ch) in name.char_indices() {
        if ch.is_ascii_alphanumeric() {
            let boundary = match prev {
                None => true,
                Some(p) => {
                    !p.is_ascii_alphanumeric() || (p.is_ascii_lowercase() && ch.is_ascii_uppercase())
                }
            };
            if boundary {
                starts.push(at);
            }
        }
        prev = Some(ch);
    }
    starts
}

/// In-memory credential store keyed by integration id.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    entries: HashMap<String, Credential>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential under an id.
    pub fn with(mut self, id: impl Into<String>, credential: Credential) -> Self {
        self.insert(id, credential);
        self
    }

    /// Register a credential in place, replacing any previous entry.
    pub fn insert(&mut self, id: impl Into<String>, credential: Credential) {
        self.entries.insert(id.into(), credential);
    }

    /// Load a JSON object mapping ids to credentials.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| EnrichError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let entries: HashMap<String, Credential> = serde_json::from_str(&content)?;
        debug!(count = entries.len(), path = %path.display(), "Loaded credentials");
        Ok(Self { entries })
    }

    /// Fill generic ids from the conventional environment variables.
    ///
    /// Existing entries are never overwritten.
    pub fn with_env_defaults(mut self) -> Self {
        let env = [
            (BackendKind::OpenAi, std::env::var("OPENAI_API_KEY").ok(), None),
            (BackendKind::Anthropic, std::env::var("ANTHROPIC_API_KEY").ok(), None),
            (
                BackendKind::Ollama,
                std::env::var("OLLAMA_HOST").ok().map(|_| String::new()),
                std::env::var("OLLAMA_HOST").ok(),
            ),
        ];
        for (kind, key, base_url) in env {
            if let Some(key) = key {
                let mut credential = Credential::new(kind, key);
                credential.base_url = base_url;
                self.entries.entry(kind.id().to_string()).or_insert(credential);
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialResolver for StaticCredentials {
    fn resolve(&self, integration_name: &str) -> Option<Credential> {
        lookup_keys(integration_name)
            .into_iter()
            .find_map(|key| self.entries.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_keys_order() {
        let keys = lookup_keys("myOpenAI");
        assert_eq!(keys[0], "myOpenAI");
        assert_eq!(keys[1], "openai.myOpenAI");
        assert_eq!(keys.last().map(String::as_str), Some("openai"));
    }

    #[test]
    fn test_exact_match_wins() {
        let store = StaticCredentials::new()
            .with("openai", Credential::new(BackendKind::OpenAi, "generic"))
            .with("myOpenAI", Credential::new(BackendKind::OpenAi, "exact"));

        assert_eq!(store.resolve("myOpenAI").unwrap().api_key, "exact");
    }

    #[test]
    fn test_dotted_then_generic_fallback() {
        let store = StaticCredentials::new()
            .with("anthropic", Credential::new(BackendKind::Anthropic, "generic"))
            .with("anthropic.work", Credential::new(BackendKind::Anthropic, "dotted"));

        assert_eq!(store.resolve("work").unwrap().api_key, "dotted");
        assert_eq!(store.resolve("myAnthropic").unwrap().api_key, "generic");
        assert!(store.resolve("unrelated").is_none());
        assert!(!store.has_credential("unrelated"));
    }

    #[test]
    fn test_generic_fallback_matches_whole_words() {
        let store = StaticCredentials::new()
            .with("mock", Credential::new(BackendKind::Mock, ""))
            .with("ollama", Credential::new(BackendKind::Ollama, ""));

        assert!(store.resolve("hammockAI").is_none());
        assert!(store.resolve("mockProvider").is_some());
        assert_eq!(store.resolve("gpu-ollama").unwrap().backend, BackendKind::Ollama);
        assert_eq!(store.resolve("workOllama").unwrap().backend, BackendKind::Ollama);
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("OpenAI".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert!("gemini".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_credentials_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"myOpenAI": {"backend": "openai", "apiKey": "sk-test"},
                 "local": {"backend": "ollama", "baseUrl": "http://gpu:11434"}}"#,
        )
        .unwrap();

        let store = StaticCredentials::from_file(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        let local = store.resolve("local").unwrap();
        assert_eq!(local.backend, BackendKind::Ollama);
        assert_eq!(local.api_key, "");
        assert!(!format!("{:?}", store.resolve("myOpenAI").unwrap()).contains("sk-test"));
    }
}
