use thiserror::Error;

/// Top-level error type for the `aqiwatch-api` crate.
///
/// Covers every failure mode of the two backend surfaces: the HTTP health
/// endpoint and the realtime WebSocket stream. `aqiwatch-core` maps these
/// into channel failure reasons.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Health endpoint ─────────────────────────────────────────────
    /// The health endpoint answered with a non-success HTTP status.
    #[error("Health check returned HTTP {status}")]
    HealthStatus { status: u16 },

    /// The health endpoint answered 2xx but reported itself unhealthy.
    #[error("Backend reported status '{status}'")]
    Unhealthy { status: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// A subscription frame was requested while no session is open.
    #[error("Realtime stream is not connected")]
    NotConnected,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON (de)serialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::HealthStatus { status } => *status >= 500,
            Self::Timeout { .. }
            | Self::Unhealthy { .. }
            | Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. } => true,
            _ => false,
        }
    }
}
