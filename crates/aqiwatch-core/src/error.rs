// ── Core error types ──
//
// Errors surfaced by aqiwatch-core. Connectivity failures almost never
// reach callers as `Err`: the ConnectionManager folds them into channel
// state. They exist as values so collaborators can hand the manager a
// reason string. The `From<aqiwatch_api::Error>` impl translates
// transport-layer errors into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connectivity ─────────────────────────────────────────────────
    #[error("{reason}")]
    NetworkFailure { reason: String },

    #[error("timeout")]
    Timeout,

    #[error("{channel} channel is not connected")]
    NotConnected { channel: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Human-readable reason recorded on a channel that fails with this error.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<aqiwatch_api::Error> for CoreError {
    fn from(err: aqiwatch_api::Error) -> Self {
        match err {
            aqiwatch_api::Error::Timeout { .. } => CoreError::Timeout,
            aqiwatch_api::Error::Transport(ref e) if e.is_timeout() => CoreError::Timeout,
            aqiwatch_api::Error::NotConnected => CoreError::NotConnected {
                channel: "realtime".into(),
            },
            aqiwatch_api::Error::InvalidUrl(e) => CoreError::InvalidConfiguration {
                message: format!("Invalid URL: {e}"),
            },
            aqiwatch_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            other => CoreError::NetworkFailure {
                reason: other.to_string(),
            },
        }
    }
}
