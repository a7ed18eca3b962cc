// ── Notification records ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// AQI severity band. Upper bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiBand {
    Good,
    Fair,
    Moderate,
    Poor,
    VeryPoor,
    Hazardous,
}

impl AqiBand {
    /// Classify a value with the fixed breakpoints 50/100/150/200/300.
    ///
    /// Values below zero land in `Good`. Callers are expected to filter
    /// non-finite values; `NaN` falls through every comparison and lands in
    /// `Hazardous`.
    pub fn classify(value: f64) -> Self {
        if value <= 50.0 {
            Self::Good
        } else if value <= 100.0 {
            Self::Fair
        } else if value <= 150.0 {
            Self::Moderate
        } else if value <= 200.0 {
            Self::Poor
        } else if value <= 300.0 {
            Self::VeryPoor
        } else {
            Self::Hazardous
        }
    }

    pub fn priority(self) -> Priority {
        match self {
            Self::Good | Self::Fair => Priority::Low,
            Self::Moderate => Priority::Medium,
            Self::Poor => Priority::High,
            Self::VeryPoor | Self::Hazardous => Priority::Critical,
        }
    }

    /// Human label, e.g. "Very Poor".
    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Moderate => "Moderate",
            Self::Poor => "Poor",
            Self::VeryPoor => "Very Poor",
            Self::Hazardous => "Hazardous",
        }
    }
}

/// Notification category: an AQI band or one of the synthesized kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Good,
    Fair,
    Moderate,
    Poor,
    VeryPoor,
    Hazardous,
    Info,
    Health,
    Forecast,
    Success,
}

impl From<AqiBand> for NotificationCategory {
    fn from(band: AqiBand) -> Self {
        match band {
            AqiBand::Good => Self::Good,
            AqiBand::Fair => Self::Fair,
            AqiBand::Moderate => Self::Moderate,
            AqiBand::Poor => Self::Poor,
            AqiBand::VeryPoor => Self::VeryPoor,
            AqiBand::Hazardous => Self::Hazardous,
        }
    }
}

impl From<SyntheticKind> for NotificationCategory {
    fn from(kind: SyntheticKind) -> Self {
        match kind {
            SyntheticKind::Health => Self::Health,
            SyntheticKind::Forecast => Self::Forecast,
            SyntheticKind::Info => Self::Info,
            SyntheticKind::Success => Self::Success,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// Kinds of notification that bypass threshold logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntheticKind {
    Health,
    Forecast,
    Info,
    Success,
}

/// A user-facing notification.
///
/// Owned by the sink once emitted. `read` is consumer state: the engine
/// sets it to `false` at creation and never looks at it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique and monotonic per engine, e.g. `aqi-00000001`.
    pub id: String,
    /// Present for reading-driven notifications.
    pub subject_id: Option<String>,
    pub category: NotificationCategory,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}
