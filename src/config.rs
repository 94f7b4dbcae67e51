//! Environment-sourced configuration.
//!
//! One explicitly constructed [`Config`] value is built at startup and passed
//! to each component at construction time. Every variable is accepted under a
//! `HELMSMAN_` prefix, with an unprefixed fallback for the conventional names.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of history turns supplied to the orchestrator.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
/// Default chunk size (characters) for the retrieval index.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap (characters) between adjacent chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
/// Default number of passages returned by a retrieval search.
pub const DEFAULT_SEARCH_K: usize = 4;

#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the language-model and embedding provider.
    pub openai_api_key: String,
    /// Base URL for the provider (injectable for tests).
    pub openai_base_url: String,
    /// Base URL of the remote API exposed to the agent through the bridge.
    pub remote_api_url: String,
    /// Shared secret expected in the `X-API-Key` request header.
    pub shared_secret: String,
    /// Path to the bridge executable. `None` disables bridged tools.
    pub mcp_command: Option<String>,
    /// Where the fetched machine-readable API description is written.
    pub api_spec_path: PathBuf,
    /// Directory of `*.txt` documents indexed at startup.
    pub docs_dir: PathBuf,
    /// SQLite database file for chat history.
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub temperature: f64,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub history_limit: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub search_k: usize,
    pub bridge_call_timeout_secs: u64,
    pub orchestration_timeout_secs: u64,
    pub stream_char_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com".to_string(),
            remote_api_url: "http://127.0.0.1:8001".to_string(),
            shared_secret: String::new(),
            mcp_command: None,
            api_spec_path: PathBuf::from("openapi.json"),
            docs_dir: PathBuf::from("rag_documents"),
            db_path: PathBuf::from("chat.db"),
            host: "127.0.0.1".to_string(),
            port: 8002,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            history_limit: DEFAULT_HISTORY_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            search_k: DEFAULT_SEARCH_K,
            bridge_call_timeout_secs: 30,
            orchestration_timeout_secs: 120,
            stream_char_delay_ms: 5,
        }
    }
}

impl Config {
    /// Build a config from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Testable core of [`Config::from_env`]: the lookup closure stands in
    /// for the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let get = |name: &str| -> Option<String> {
            lookup(&format!("HELMSMAN_{name}"))
                .or_else(|| lookup(name))
                .filter(|value| !value.is_empty())
        };

        if let Some(key) = get("OPENAI_API_KEY") {
            config.openai_api_key = key;
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.openai_base_url = url;
        }
        if let Some(url) = get("REMOTE_API_URL") {
            config.remote_api_url = url;
        }
        if let Some(secret) = get("SHARED_SECRET") {
            config.shared_secret = secret;
        }
        if let Some(command) = get("MCP_COMMAND") {
            config.mcp_command = Some(command);
        }
        if let Some(path) = get("API_SPEC_PATH") {
            config.api_spec_path = PathBuf::from(path);
        }
        if let Some(dir) = get("DOCS_DIR") {
            config.docs_dir = PathBuf::from(dir);
        }
        if let Some(path) = get("DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(host) = get("HOST") {
            config.host = host;
        }
        if let Some(port) = get("PORT").and_then(|p| p.parse::<u16>().ok()) {
            config.port = port;
        }
        if let Some(model) = get("MODEL") {
            config.model = model;
        }
        if let Some(temp) = get("TEMPERATURE").and_then(|t| t.parse::<f64>().ok())
            && (0.0..=2.0).contains(&temp)
        {
            config.temperature = temp;
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(secs) = get("ORCHESTRATION_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
            config.orchestration_timeout_secs = secs;
        }

        config
    }

    /// Reject configurations the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shared_secret.is_empty() {
            return Err(ConfigError::MissingVar("SHARED_SECRET"));
        }
        if self.model.is_empty() {
            return Err(ConfigError::Validation("model must not be empty".into()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Validation("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.history_limit == 0 || self.search_k == 0 {
            return Err(ConfigError::Validation(
                "history_limit and search_k must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn orchestration_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestration_timeout_secs)
    }

    pub fn stream_char_delay(&self) -> Duration {
        Duration::from_millis(self.stream_char_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.search_k, 4);
        assert_eq!(config.stream_char_delay_ms, 5);
    }

    #[test]
    fn prefixed_name_wins_over_fallback() {
        let config = Config::from_lookup(lookup_from(&[
            ("HELMSMAN_SHARED_SECRET", "prefixed"),
            ("SHARED_SECRET", "fallback"),
        ]));
        assert_eq!(config.shared_secret, "prefixed");
    }

    #[test]
    fn fallback_name_is_honored() {
        let config = Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")]));
        assert_eq!(config.openai_api_key, "sk-test");
    }

    #[test]
    fn empty_value_is_ignored() {
        let config = Config::from_lookup(lookup_from(&[("MODEL", "")]));
        assert_eq!(config.model, "gpt-4o-mini");
    }

    #[test]
    fn out_of_range_temperature_is_ignored() {
        let config = Config::from_lookup(lookup_from(&[("TEMPERATURE", "9.5")]));
        assert!((config.temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_rejects_empty_secret() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_overlap_at_least_chunk_size() {
        let config = Config {
            shared_secret: "s3cret".into(),
            chunk_size: 100,
            chunk_overlap: 100,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn validate_accepts_complete_config() {
        let config = Config {
            shared_secret: "s3cret".into(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }
}
