// ── Health advisories and forecast trends ──

use serde::Serialize;
use strum::Display;

use crate::model::AqiBand;

/// Guidance for one AQI band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthAdvice {
    pub general: &'static str,
    pub sensitive_groups: &'static str,
    /// `None` when no mask is needed.
    pub mask: Option<&'static str>,
    pub exercise: &'static str,
}

impl HealthAdvice {
    pub fn for_band(band: AqiBand) -> Self {
        match band {
            AqiBand::Good => Self {
                general: "Air quality is excellent for outdoor activities.",
                sensitive_groups: "No precautions are needed.",
                mask: None,
                exercise: "Outdoor exercise is ideal.",
            },
            AqiBand::Fair => Self {
                general: "Air quality is acceptable.",
                sensitive_groups: "People with respiratory conditions may notice minor irritation.",
                mask: None,
                exercise: "Outdoor exercise is fine; pay attention to how you feel.",
            },
            AqiBand::Moderate => Self {
                general: "Sensitive groups should reduce prolonged outdoor exposure.",
                sensitive_groups: "Children, older adults and people with heart or lung disease should limit time outside.",
                mask: Some("A mask is recommended for sensitive groups."),
                exercise: "Keep outdoor workouts light.",
            },
            AqiBand::Poor => Self {
                general: "Everyone should reduce outdoor exposure.",
                sensitive_groups: "Sensitive groups should avoid outdoor activity.",
                mask: Some("Wear an N95 mask outdoors."),
                exercise: "Exercise indoors only.",
            },
            AqiBand::VeryPoor => Self {
                general: "Avoid all outdoor activity.",
                sensitive_groups: "Stay indoors with air purification running.",
                mask: Some("An N95 or N99 mask is essential if you must go out."),
                exercise: "Only light indoor exercise in a well-ventilated room.",
            },
            AqiBand::Hazardous => Self {
                general: "Health emergency: air quality is hazardous.",
                sensitive_groups: "Seek clean-air shelter and medical advice if symptoms appear.",
                mask: Some("Wear an N99 mask and eye protection for any unavoidable exposure."),
                exercise: "Avoid physical exertion.",
            },
        }
    }

    pub fn mask_required(&self) -> bool {
        self.mask.is_some()
    }
}

/// Direction of a forecast relative to the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastTrend {
    Improving,
    Stable,
    Worsening,
}

impl ForecastTrend {
    /// Compare the mean of `forecasts` against `current` with a ±10% band.
    ///
    /// Returns `None` when there are no finite forecast values.
    pub fn from_outlook(current: f64, forecasts: &[f64]) -> Option<(Self, f64)> {
        let finite: Vec<f64> = forecasts.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let average = finite.iter().sum::<f64>() / finite.len() as f64;

        let trend = if average < current * 0.9 {
            Self::Improving
        } else if average > current * 1.1 {
            Self::Worsening
        } else {
            Self::Stable
        };
        Some((trend, average))
    }
}
