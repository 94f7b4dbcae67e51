use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for Helmsman.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum HelmsmanError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Credential check ─────────────────────────────────────────────────
    #[error("auth: {0}")]
    Auth(#[from] AuthError),

    // ── Message store ────────────────────────────────────────────────────
    #[error("history: {0}")]
    History(#[from] HistoryError),

    // ── Retrieval index ──────────────────────────────────────────────────
    #[error("retrieval: {0}")]
    Retrieval(#[from] RetrievalError),

    // ── Tool bridge ──────────────────────────────────────────────────────
    #[error("bridge: {0}")]
    Bridge(#[from] BridgeError),

    // ── Agent orchestration ──────────────────────────────────────────────
    #[error("agent: {0}")]
    Agent(#[from] AgentError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),
}

// ─── Credential errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential header missing")]
    MissingCredential,

    #[error("credential rejected")]
    InvalidCredential,
}

// ─── Message store errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("schema init failed: {0}")]
    Schema(String),
}

// ─── Retrieval errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("document load failed: {0}")]
    DocumentLoad(String),

    #[error("embedding failed: {0}")]
    Embedding(String),
}

// ─── Tool bridge errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to start bridge process '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("bridge is not active")]
    NotActive,

    #[error("bridge tool '{tool}' timed out after {timeout_secs}s")]
    CallTimeout { tool: String, timeout_secs: u64 },

    #[error("bridge tool '{tool}' call failed: {message}")]
    Call { tool: String, message: String },
}

// ─── Agent errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model request failed: {0}")]
    Upstream(String),

    #[error("orchestration timed out after {0}s")]
    Timeout(u64),
}

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, HelmsmanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_correctly() {
        let err = HelmsmanError::Config(ConfigError::Validation("bad overlap".into()));
        assert!(err.to_string().contains("validation failed"));
    }

    #[test]
    fn bridge_timeout_displays_seconds() {
        let err = HelmsmanError::Bridge(BridgeError::CallTimeout {
            tool: "api_get_user_info".into(),
            timeout_secs: 30,
        });
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let err: HelmsmanError = anyhow_err.into();
        assert!(err.to_string().contains("something went wrong"));
    }

    #[test]
    fn bridge_spawn_names_command() {
        let err = HelmsmanError::Bridge(BridgeError::Spawn {
            command: "/usr/local/bin/openapi-mcp".into(),
            message: "No such file or directory".into(),
        });
        assert!(err.to_string().contains("openapi-mcp"));
        assert!(err.to_string().contains("No such file"));
    }
}
