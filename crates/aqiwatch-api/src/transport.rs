// Shared transport configuration for building reqwest::Client instances
// and WebSocket upgrade requests.
//
// The health client and the realtime client share TLS, timeout, and the
// ingest secret header through this module.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Header carrying the shared ingest secret on every backend request.
pub const SECRET_HEADER: &str = "X-Ingest-Secret";

const USER_AGENT: &str = concat!("aqiwatch/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed development backends).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building backend clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
    /// Shared secret sent as [`SECRET_HEADER`], if configured.
    pub secret: Option<SecretString>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(15),
            secret: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(self.default_headers()?);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Headers attached to every request (the ingest secret, when set).
    pub fn default_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        if let Some(secret) = &self.secret {
            let mut value = HeaderValue::from_str(secret.expose_secret())
                .map_err(|e| Error::Tls(format!("ingest secret is not a valid header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(SECRET_HEADER, value);
        }
        Ok(headers)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn no_secret_means_no_headers() {
        let config = TransportConfig::default();
        assert!(config.default_headers().unwrap().is_empty());
    }

    #[test]
    fn secret_is_sent_as_sensitive_header() {
        let config = TransportConfig {
            secret: Some(SecretString::from("dev-secret".to_string())),
            ..TransportConfig::default()
        };
        let headers = config.default_headers().unwrap();
        let value = headers.get(SECRET_HEADER).unwrap();
        assert_eq!(value.to_str().unwrap(), "dev-secret");
        assert!(value.is_sensitive());
    }

    #[test]
    fn secret_with_newline_is_rejected() {
        let config = TransportConfig {
            secret: Some(SecretString::from("bad\nsecret".to_string())),
            ..TransportConfig::default()
        };
        assert!(matches!(config.default_headers(), Err(Error::Tls(_))));
    }
}
