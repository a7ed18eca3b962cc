//! Request/response health probe against the backend API.
//!
//! A probe is a single `GET {base}/health`. Any 2xx answer counts as
//! healthy unless the body is a JSON object whose `status` field says
//! otherwise.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Values of `status` accepted as healthy (case-insensitive).
const HEALTHY_STATUSES: &[&str] = &["ok", "healthy", "up", "pass"];

/// Body of a health response. Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

fn default_status() -> String {
    "ok".into()
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            status: default_status(),
            version: None,
        }
    }
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        HEALTHY_STATUSES
            .iter()
            .any(|s| self.status.eq_ignore_ascii_case(s))
    }
}

/// HTTP client for the backend health endpoint.
#[derive(Debug, Clone)]
pub struct HealthClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl HealthClient {
    /// Build a client from a base API URL and shared transport settings.
    pub fn new(base_url: &Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(http, base_url)
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: &Url) -> Result<Self, Error> {
        let endpoint = health_endpoint(base_url)?;
        Ok(Self { http, endpoint })
    }

    /// The fully resolved probe URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Perform one probe.
    pub async fn check(&self) -> Result<HealthReport, Error> {
        debug!(url = %self.endpoint, "probing backend health");

        let response = self.http.get(self.endpoint.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HealthStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let report = parse_report(&body);
        if report.is_healthy() {
            Ok(report)
        } else {
            Err(Error::Unhealthy {
                status: report.status,
            })
        }
    }
}

/// Append `health` to the base path, keeping any prefix the base URL has.
fn health_endpoint(base_url: &Url) -> Result<Url, Error> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join("health")?)
}

/// A non-JSON or non-object body on a 2xx response is still healthy.
fn parse_report(body: &str) -> HealthReport {
    if body.trim().is_empty() {
        return HealthReport::default();
    }
    match serde_json::from_str::<HealthReport>(body) {
        Ok(report) => report,
        Err(e) => {
            debug!(error = %e, "health body is not a status object, assuming ok");
            HealthReport::default()
        }
    }
}
