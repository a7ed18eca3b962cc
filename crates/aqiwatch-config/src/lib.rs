//! Configuration for aqiwatch.
//!
//! TOML file + `AQIWATCH_` environment overrides, ingest-secret resolution
//! (env var, keyring, plaintext), and translation into the runtime types
//! that `aqiwatch-api` and `aqiwatch-core` consume.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use aqiwatch_api::{TlsMode, TransportConfig};
use aqiwatch_core::{AlertRule, ManagerConfig, RetryPolicy, Subject};

/// Keyring service name for stored secrets.
pub const KEYRING_SERVICE: &str = "aqiwatch";
/// Keyring account holding the ingest secret.
pub const KEYRING_SECRET_ACCOUNT: &str = "ingest-secret";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no ingest secret configured")]
    NoSecret,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Subjects the `watch` command subscribes to.
    #[serde(default)]
    pub subjects: Vec<SubjectConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL of the request/response API; `/health` is appended.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// WebSocket URL of the realtime stream.
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,

    /// Ingest secret (plaintext, prefer keyring or env var).
    pub secret: Option<String>,

    /// Environment variable name containing the ingest secret.
    pub secret_env: Option<String>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid certificates on the API channel.
    #[serde(default)]
    pub insecure: bool,

    /// HTTP request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on one health probe.
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,

    /// How long realtime may stay `Connecting`.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            realtime_url: default_realtime_url(),
            secret: None,
            secret_env: None,
            ca_cert: None,
            insecure: false,
            timeout_secs: default_timeout_secs(),
            health_timeout_secs: default_health_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8000".into()
}
fn default_realtime_url() -> String {
    "ws://localhost:8000/ws".into()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_health_timeout_secs() -> u64 {
    5
}
fn default_connect_timeout_secs() -> u64 {
    3
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Liveness probe period once everything is connected.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

fn default_initial_delay_secs() -> u64 {
    1
}
fn default_max_delay_secs() -> u64 {
    30
}
fn default_check_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AlertsConfig {
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,

    #[serde(default = "default_min_delta")]
    pub min_delta: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: default_cooldown_minutes(),
            min_delta: default_min_delta(),
        }
    }
}

fn default_cooldown_minutes() -> i64 {
    30
}
fn default_min_delta() -> f64 {
    20.0
}

/// A monitored subject: either `station = "..."` or `lat`/`lon`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SubjectConfig {
    /// Display name.
    pub name: Option<String>,
    pub station: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl SubjectConfig {
    pub fn to_subject(&self) -> Result<Subject, ConfigError> {
        match (&self.station, self.lat, self.lon) {
            (Some(station), None, None) => {
                if station.trim().is_empty() {
                    return Err(invalid("subjects.station", "must not be empty"));
                }
                Ok(Subject::Station(station.clone()))
            }
            (None, Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(invalid("subjects.lat", format!("{lat} is out of range")));
                }
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(invalid("subjects.lon", format!("{lon} is out of range")));
                }
                Ok(Subject::Location { lat, lon })
            }
            _ => Err(invalid(
                "subjects",
                "each entry needs either `station` or both `lat` and `lon`",
            )),
        }
    }

    /// The configured `name`, else the station id or coordinates.
    pub fn label(&self) -> String {
        if let Some(ref name) = self.name {
            return name.clone();
        }
        match (&self.station, self.lat, self.lon) {
            (Some(station), _, _) => station.clone(),
            (None, Some(lat), Some(lon)) => format!("{lat},{lon}"),
            _ => "unnamed".into(),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "aqiwatch", "aqiwatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("aqiwatch");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields defaults plus env.
///
/// Environment variables use the `AQIWATCH_` prefix with `__` between
/// nesting levels, e.g. `AQIWATCH_ALERTS__MIN_DELTA=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("AQIWATCH_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Secret resolution ───────────────────────────────────────────────

/// Resolve the ingest secret: `secret_env` variable, then the system
/// keyring, then the plaintext `secret` field.
pub fn resolve_secret(backend: &BackendConfig) -> Result<SecretString, ConfigError> {
    // 1. Named env var
    if let Some(ref env_name) = backend.secret_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_SECRET_ACCOUNT) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref secret) = backend.secret {
        return Ok(SecretString::from(secret.clone()));
    }

    Err(ConfigError::NoSecret)
}

// ── Translation to runtime types ────────────────────────────────────

pub fn api_url(cfg: &Config) -> Result<Url, ConfigError> {
    let url: Url = cfg
        .backend
        .api_url
        .parse()
        .map_err(|e| invalid("backend.api_url", format!("{e}: {}", cfg.backend.api_url)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("backend.api_url", "scheme must be http or https"));
    }
    Ok(url)
}

pub fn realtime_url(cfg: &Config) -> Result<Url, ConfigError> {
    let url: Url = cfg.backend.realtime_url.parse().map_err(|e| {
        invalid(
            "backend.realtime_url",
            format!("{e}: {}", cfg.backend.realtime_url),
        )
    })?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(invalid("backend.realtime_url", "scheme must be ws or wss"));
    }
    Ok(url)
}

/// Transport settings for both backend clients. A missing secret is not
/// an error: requests are simply sent without the header.
pub fn transport_config(cfg: &Config) -> TransportConfig {
    let tls = if cfg.backend.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = cfg.backend.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    TransportConfig {
        tls,
        timeout: Duration::from_secs(cfg.backend.timeout_secs),
        secret: resolve_secret(&cfg.backend).ok(),
    }
}

pub fn manager_config(cfg: &Config) -> Result<ManagerConfig, ConfigError> {
    let retry = &cfg.retry;
    if retry.initial_delay_secs == 0 {
        return Err(invalid("retry.initial_delay_secs", "must be at least 1"));
    }
    if retry.max_delay_secs < retry.initial_delay_secs {
        return Err(invalid(
            "retry.max_delay_secs",
            "must not be smaller than initial_delay_secs",
        ));
    }
    if retry.check_interval_secs == 0 {
        return Err(invalid("retry.check_interval_secs", "must be at least 1"));
    }

    Ok(ManagerConfig {
        health_timeout: Duration::from_secs(cfg.backend.health_timeout_secs),
        connect_timeout: Duration::from_secs(cfg.backend.connect_timeout_secs),
        retry: RetryPolicy {
            initial_delay: Duration::from_secs(retry.initial_delay_secs),
            max_delay: Duration::from_secs(retry.max_delay_secs),
            check_interval: Duration::from_secs(retry.check_interval_secs),
        },
    })
}

/// The alert rule, validated so it can never panic the engine.
pub fn alert_rule(cfg: &Config) -> Result<AlertRule, ConfigError> {
    let cooldown = TimeDelta::try_minutes(cfg.alerts.cooldown_minutes)
        .ok_or_else(|| invalid("alerts.cooldown_minutes", "out of range"))?;
    AlertRule::new(cooldown, cfg.alerts.min_delta)
        .map_err(|e| invalid("alerts", e.to_string()))
}

pub fn subjects(cfg: &Config) -> Result<Vec<Subject>, ConfigError> {
    cfg.subjects.iter().map(SubjectConfig::to_subject).collect()
}

/// Display labels for the configured subjects, in file order.
pub fn subject_labels(cfg: &Config) -> Vec<String> {
    cfg.subjects.iter().map(SubjectConfig::label).collect()
}

/// Run every translation once and report the first problem.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    api_url(cfg)?;
    realtime_url(cfg)?;
    manager_config(cfg)?;
    alert_rule(cfg)?;
    subjects(cfg)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.backend.timeout_secs, 15);
        assert_eq!(cfg.backend.connect_timeout_secs, 3);
        assert_eq!(cfg.alerts.cooldown_minutes, 30);
        assert!(validate(&cfg).is_ok());

        let rule = alert_rule(&cfg).unwrap();
        assert_eq!(rule, AlertRule::default());
        assert_eq!(manager_config(&cfg).unwrap(), ManagerConfig::default());
    }

    #[test]
    fn file_and_env_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "aqiwatch.toml",
                r#"
                [backend]
                api_url = "https://aqi.example.org/api"
                realtime_url = "wss://aqi.example.org/ws"

                [alerts]
                cooldown_minutes = 15

                [[subjects]]
                station = "DL-001"

                [[subjects]]
                name = "Home"
                lat = 28.61
                lon = 77.21
                "#,
            )?;
            jail.set_env("AQIWATCH_ALERTS__MIN_DELTA", "12.5");
            jail.set_env("AQIWATCH_BACKEND__TIMEOUT_SECS", "40");

            let cfg = load_config_from(Path::new("aqiwatch.toml")).unwrap();

            assert_eq!(cfg.backend.api_url, "https://aqi.example.org/api");
            assert_eq!(cfg.backend.timeout_secs, 40);
            assert_eq!(cfg.alerts.cooldown_minutes, 15);
            assert!((cfg.alerts.min_delta - 12.5).abs() < f64::EPSILON);
            assert_eq!(
                subjects(&cfg).unwrap(),
                vec![
                    Subject::Station("DL-001".into()),
                    Subject::Location { lat: 28.61, lon: 77.21 },
                ]
            );
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let cfg = load_config_from(Path::new("does-not-exist.toml")).unwrap();
            assert_eq!(cfg, Config::default());
            Ok(())
        });
    }

    #[test]
    fn secret_env_wins_over_plaintext() {
        Jail::expect_with(|jail| {
            jail.set_env("MY_INGEST_SECRET", "from-env");
            let backend = BackendConfig {
                secret: Some("from-file".into()),
                secret_env: Some("MY_INGEST_SECRET".into()),
                ..BackendConfig::default()
            };
            let secret = resolve_secret(&backend).unwrap();
            assert_eq!(secret.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn invalid_alert_rule_is_a_validation_error() {
        let mut cfg = Config::default();
        cfg.alerts.min_delta = -3.0;
        assert!(matches!(
            alert_rule(&cfg),
            Err(ConfigError::Validation { ref field, .. }) if field == "alerts"
        ));
    }

    #[test]
    fn subject_labels_prefer_name() {
        let cfg = Config {
            subjects: vec![
                SubjectConfig {
                    name: Some("Home".into()),
                    station: Some("DL-001".into()),
                    ..SubjectConfig::default()
                },
                SubjectConfig {
                    station: Some("DL-002".into()),
                    ..SubjectConfig::default()
                },
                SubjectConfig {
                    lat: Some(28.5),
                    lon: Some(77.25),
                    ..SubjectConfig::default()
                },
            ],
            ..Config::default()
        };
        assert_eq!(subject_labels(&cfg), vec!["Home", "DL-002", "28.5,77.25"]);
    }

    #[test]
    fn subject_needs_station_or_coordinates() {
        let both = SubjectConfig {
            station: Some("X".into()),
            lat: Some(1.0),
            lon: Some(2.0),
            ..SubjectConfig::default()
        };
        assert!(both.to_subject().is_err());

        let half = SubjectConfig {
            lat: Some(1.0),
            ..SubjectConfig::default()
        };
        assert!(half.to_subject().is_err());

        let far = SubjectConfig {
            lat: Some(91.0),
            lon: Some(0.0),
            ..SubjectConfig::default()
        };
        assert!(far.to_subject().is_err());
    }

    #[test]
    fn url_schemes_are_checked() {
        let mut cfg = Config::default();
        cfg.backend.realtime_url = "http://localhost:8000/ws".into();
        assert!(realtime_url(&cfg).is_err());

        cfg.backend.api_url = "ftp://example.org".into();
        assert!(api_url(&cfg).is_err());
    }

    #[test]
    fn insecure_selects_danger_mode() {
        let mut cfg = Config::default();
        cfg.backend.insecure = true;
        assert!(matches!(transport_config(&cfg).tls, TlsMode::DangerAcceptInvalid));
        assert_eq!(transport_config(&cfg).timeout, Duration::from_secs(15));
    }

    #[test]
    fn save_then_load_preserves_subjects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.subjects.push(SubjectConfig {
            station: Some("DL-001".into()),
            ..SubjectConfig::default()
        });
        save_config_to(&cfg, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("station = \"DL-001\""));
    }
}
