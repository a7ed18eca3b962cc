// ── Notification text ──

use crate::model::AqiBand;

use super::advisory::{ForecastTrend, HealthAdvice};

/// Title and message for a reading-driven notification.
pub(crate) fn reading_text(band: AqiBand, subject_id: &str, value: f64) -> (String, String) {
    let title = match band {
        AqiBand::Good => format!("Air quality is good in {subject_id}"),
        AqiBand::Fair => format!("Air quality is fair in {subject_id}"),
        AqiBand::Moderate => format!("Moderate air quality in {subject_id}"),
        AqiBand::Poor => format!("Poor air quality alert: {subject_id}"),
        AqiBand::VeryPoor => format!("Very poor air quality alert: {subject_id}"),
        AqiBand::Hazardous => format!("Hazardous air quality: {subject_id}"),
    };
    let guidance = match band {
        AqiBand::Good => "Enjoy outdoor activities.",
        AqiBand::Fair => "Unusually sensitive people should watch for symptoms.",
        AqiBand::Moderate => "Sensitive groups should limit prolonged outdoor exertion.",
        AqiBand::Poor => "Reduce time outdoors and wear a mask if you go out.",
        AqiBand::VeryPoor => "Avoid outdoor activity. Keep windows closed.",
        AqiBand::Hazardous => "Stay indoors. This is a health emergency.",
    };
    let message = format!("AQI is {value:.0} ({}). {guidance}", band.label());
    (title, message)
}

pub(crate) fn advisory_text(
    band: AqiBand,
    subject_id: &str,
    advice: &HealthAdvice,
) -> (String, String) {
    let title = format!("Health advisory for {subject_id}: {}", band.label());
    let mut message = format!("{} {}", advice.general, advice.sensitive_groups);
    if let Some(mask) = advice.mask {
        message.push(' ');
        message.push_str(mask);
    }
    message.push(' ');
    message.push_str(advice.exercise);
    (title, message)
}

pub(crate) fn forecast_text(
    subject_id: &str,
    current: f64,
    average: f64,
    trend: ForecastTrend,
) -> (String, String) {
    let title = match trend {
        ForecastTrend::Improving => format!("Air quality improving in {subject_id}"),
        ForecastTrend::Worsening => format!("Air quality worsening in {subject_id}"),
        ForecastTrend::Stable => format!("Air quality steady in {subject_id}"),
    };
    let band = AqiBand::classify(average);
    let message = format!(
        "Current AQI {current:.0}; forecast average {average:.0} ({}).",
        band.label()
    );
    (title, message)
}
