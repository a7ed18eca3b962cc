// ── Readings and subjects ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One measured index value for a subject.
///
/// Readings must be presented to the alert engine in non-decreasing
/// `observed_at` order; the engine never reorders or buffers them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub subject_id: String,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(subject_id: impl Into<String>, value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject_id.into(),
            value,
            observed_at,
        }
    }
}

impl From<&aqiwatch_api::AqiUpdate> for Reading {
    fn from(update: &aqiwatch_api::AqiUpdate) -> Self {
        Self {
            subject_id: update.subject_id.clone(),
            value: update.aqi,
            observed_at: update.observed_at,
        }
    }
}

/// What a realtime subscription points at.
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    /// A monitoring station by identifier.
    Station(String),
    /// The nearest data for a coordinate pair.
    Location { lat: f64, lon: f64 },
}

impl Subject {
    /// Stable identifier used as the alert engine's subject key.
    pub fn id(&self) -> String {
        match self {
            Self::Station(id) => id.clone(),
            Self::Location { lat, lon } => format!("{lat:.4},{lon:.4}"),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Station(id) => write!(f, "station {id}"),
            Self::Location { lat, lon } => write!(f, "location ({lat:.4}, {lon:.4})"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn subject_ids() {
        assert_eq!(Subject::Station("DL-001".into()).id(), "DL-001");
        assert_eq!(
            Subject::Location { lat: 28.6139, lon: 77.209 }.id(),
            "28.6139,77.2090"
        );
    }

    #[test]
    fn reading_deserializes_from_json() {
        let reading: Reading = serde_json::from_str(
            r#"{"subject_id":"DL-001","value":85,"observed_at":"2025-09-08T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(reading.subject_id, "DL-001");
        assert!((reading.value - 85.0).abs() < f64::EPSILON);
    }
}
