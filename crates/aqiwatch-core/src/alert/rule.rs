use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::model::AqiBand;

/// Throttling rule applied to every subject of an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    /// Minimum time between two notifications for the same subject.
    pub cooldown: TimeDelta,
    /// Minimum absolute change against the last notified value.
    pub min_delta: f64,
}

impl Default for AlertRule {
    fn default() -> Self {
        Self {
            cooldown: TimeDelta::minutes(30),
            min_delta: 20.0,
        }
    }
}

impl AlertRule {
    /// Build a validated rule.
    pub fn new(cooldown: TimeDelta, min_delta: f64) -> Result<Self, CoreError> {
        let rule = Self { cooldown, min_delta };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cooldown < TimeDelta::zero() {
            return Err(CoreError::InvalidConfiguration {
                message: format!("cooldown must not be negative (got {})", self.cooldown),
            });
        }
        if !self.min_delta.is_finite() || self.min_delta < 0.0 {
            return Err(CoreError::InvalidConfiguration {
                message: format!(
                    "min_delta must be a finite, non-negative number (got {})",
                    self.min_delta
                ),
            });
        }
        Ok(())
    }
}

/// Per-subject throttling memory.
///
/// Only updated when a notification is actually emitted for the subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertState {
    pub last_notified_value: Option<f64>,
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl AlertState {
    /// Why a reading would be suppressed under `rule`, if it would be.
    ///
    /// A change smaller than `min_delta` is always suppressed. Inside the
    /// cooldown window a reading is suppressed unless it moved into a
    /// different AQI band than the last notified value.
    pub(crate) fn suppression(
        &self,
        rule: &AlertRule,
        value: f64,
        observed_at: DateTime<Utc>,
    ) -> Option<Suppression> {
        let last = self.last_notified_value?;
        let delta = (value - last).abs();
        if delta < rule.min_delta {
            return Some(Suppression::Delta { delta });
        }

        let at = self.last_notified_at?;
        let elapsed = observed_at - at;
        if elapsed < rule.cooldown && AqiBand::classify(value) == AqiBand::classify(last) {
            return Some(Suppression::Cooldown { elapsed });
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Suppression {
    Cooldown { elapsed: TimeDelta },
    Delta { delta: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_is_thirty_minutes_twenty_points() {
        let rule = AlertRule::default();
        assert_eq!(rule.cooldown, TimeDelta::minutes(30));
        assert!((rule.min_delta - 20.0).abs() < f64::EPSILON);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn negative_values_are_rejected() {
        assert!(matches!(
            AlertRule::new(TimeDelta::minutes(-1), 20.0),
            Err(CoreError::InvalidConfiguration { .. })
        ));
        assert!(AlertRule::new(TimeDelta::minutes(30), -0.5).is_err());
        assert!(AlertRule::new(TimeDelta::minutes(30), f64::NAN).is_err());
        assert!(AlertRule::new(TimeDelta::zero(), 0.0).is_ok());
    }

    #[test]
    fn empty_state_never_suppresses() {
        let state = AlertState::default();
        assert_eq!(state.suppression(&AlertRule::default(), 10.0, Utc::now()), None);
    }

    #[test]
    fn small_delta_is_suppressed_regardless_of_time() {
        let now = Utc::now();
        let state = AlertState {
            last_notified_value: Some(100.0),
            last_notified_at: Some(now),
        };
        let rule = AlertRule::default();

        assert!(matches!(
            state.suppression(&rule, 119.0, now + TimeDelta::days(30)),
            Some(Suppression::Delta { .. })
        ));
        // Crossing a band boundary does not excuse a small change.
        assert!(matches!(
            state.suppression(&rule, 101.0, now + TimeDelta::days(30)),
            Some(Suppression::Delta { .. })
        ));
    }

    #[test]
    fn cooldown_holds_within_the_same_band() {
        let now = Utc::now();
        let state = AlertState {
            last_notified_value: Some(105.0),
            last_notified_at: Some(now),
        };
        let rule = AlertRule::default();

        assert!(matches!(
            state.suppression(&rule, 145.0, now + TimeDelta::minutes(29)),
            Some(Suppression::Cooldown { .. })
        ));
        assert_eq!(
            state.suppression(&rule, 145.0, now + TimeDelta::minutes(30)),
            None
        );
    }

    #[test]
    fn band_change_escapes_cooldown() {
        let now = Utc::now();
        let state = AlertState {
            last_notified_value: Some(85.0),
            last_notified_at: Some(now),
        };
        assert_eq!(
            state.suppression(&AlertRule::default(), 180.0, now + TimeDelta::minutes(10)),
            None
        );
    }
}
