//! CLI error types with miette diagnostics.
//!
//! Maps config, core and transport errors into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use aqiwatch_config::ConfigError;
use aqiwatch_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("No backend channel is reachable: {reason}")]
    #[diagnostic(
        code(aqiwatch::offline),
        help(
            "Check that the backend is running and reachable.\n\
             API: {api_url}\n\
             Realtime: {realtime_url}"
        )
    )]
    Offline {
        reason: String,
        api_url: String,
        realtime_url: String,
    },

    #[error("Could not set up the backend client: {reason}")]
    #[diagnostic(
        code(aqiwatch::client),
        help("Check backend.ca_cert and the URLs in your config, or try --insecure.")
    )]
    Client { reason: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out: {what}")]
    #[diagnostic(
        code(aqiwatch::timeout),
        help("Raise backend.health_timeout_secs or backend.connect_timeout_secs.")
    )]
    Timeout { what: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(aqiwatch::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(aqiwatch::config),
        help("Inspect the resolved configuration with: aqiwatch config show")
    )]
    Config(Box<ConfigError>),

    #[error("Config file already exists at {path}")]
    #[diagnostic(
        code(aqiwatch::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error("Keyring error: {reason}")]
    #[diagnostic(
        code(aqiwatch::keyring),
        help("Set backend.secret_env and export the secret instead.")
    )]
    Keyring { reason: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON input: {0}")]
    #[diagnostic(
        code(aqiwatch::json),
        help("Expected an array of {{\"subject_id\", \"value\", \"observed_at\"}} objects.")
    )]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(aqiwatch::internal))]
    Internal(String),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Offline { .. } | Self::Client { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            Self::Config(_) | Self::ConfigExists { .. } | Self::Keyring { .. } => {
                exit_code::CONFIG
            }
            Self::Io(_) | Self::Json(_) | Self::Internal(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError / transport error mapping ──────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NetworkFailure { reason } => CliError::Client { reason },
            CoreError::Timeout => CliError::Timeout {
                what: "backend request".into(),
            },
            CoreError::NotConnected { channel } => CliError::Client {
                reason: format!("{channel} channel is not connected"),
            },
            CoreError::InvalidConfiguration { message } => CliError::Validation {
                field: "configuration".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<aqiwatch_api::Error> for CliError {
    fn from(err: aqiwatch_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
