// ── Alert engine ──
//
// Turns a stream of readings into a throttled stream of notifications,
// and synthesizes advisories on demand. The engine keeps only per-subject
// throttling memory; emitted notifications belong to the sinks.

mod advisory;
mod rule;
mod templates;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::model::{AqiBand, Notification, NotificationCategory, Priority, Reading, SyntheticKind};
use crate::observer::{NotificationSink, Observers, SubscriptionId};

pub use advisory::{ForecastTrend, HealthAdvice};
pub use rule::{AlertRule, AlertState};

use rule::Suppression;

/// Deduplicating, prioritizing notification source.
///
/// Owned by a single task; every mutating operation takes `&mut self`.
#[derive(Debug)]
pub struct AlertEngine {
    rule: AlertRule,
    states: HashMap<String, AlertState>,
    sequence: u64,
    sinks: Observers<dyn NotificationSink>,
    disposed: bool,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(AlertRule::default())
    }
}

impl AlertEngine {
    /// Panics if `rule` is invalid, like [`set_rule`](Self::set_rule).
    pub fn new(rule: AlertRule) -> Self {
        assert_valid(&rule);
        Self {
            rule,
            states: HashMap::new(),
            sequence: 0,
            sinks: Observers::new(),
            disposed: false,
        }
    }

    pub fn rule(&self) -> &AlertRule {
        &self.rule
    }

    /// Replace the throttling rule for all later evaluations.
    ///
    /// A negative cooldown or a negative/non-finite delta is a programming
    /// error and panics. Validate untrusted input with
    /// [`AlertRule::validate`] first.
    pub fn set_rule(&mut self, rule: AlertRule) {
        assert_valid(&rule);
        debug!(cooldown = %rule.cooldown, min_delta = rule.min_delta, "alert rule replaced");
        self.rule = rule;
    }

    pub fn subscribe(&self, sink: Arc<dyn NotificationSink>) -> SubscriptionId {
        self.sinks.subscribe(sink)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.sinks.unsubscribe(id)
    }

    /// Throttling memory for one subject, if any notification was emitted.
    pub fn state(&self, subject_id: &str) -> Option<&AlertState> {
        self.states.get(subject_id)
    }

    // ── Reading-driven notifications ─────────────────────────────

    /// Decide whether `reading` deserves a notification.
    ///
    /// The first reading for a subject always produces one. After that a
    /// reading is suppressed when it differs from the last notified value
    /// by less than `min_delta`, or when it arrives inside the cooldown
    /// window without leaving the last notified band.
    pub fn evaluate(&mut self, reading: &Reading) -> Option<Notification> {
        if self.disposed {
            return None;
        }
        if !reading.value.is_finite() {
            warn!(
                subject = %reading.subject_id,
                value = reading.value,
                "ignoring non-finite reading"
            );
            return None;
        }

        let band = AqiBand::classify(reading.value);
        let state = self.states.entry(reading.subject_id.clone()).or_default();

        match state.suppression(&self.rule, reading.value, reading.observed_at) {
            Some(Suppression::Cooldown { elapsed }) => {
                debug!(
                    subject = %reading.subject_id,
                    value = reading.value,
                    %elapsed,
                    "suppressed: cooldown"
                );
                return None;
            }
            Some(Suppression::Delta { delta }) => {
                debug!(
                    subject = %reading.subject_id,
                    value = reading.value,
                    delta,
                    "suppressed: delta"
                );
                return None;
            }
            None => {}
        }

        state.last_notified_value = Some(reading.value);
        state.last_notified_at = Some(reading.observed_at);

        let (title, message) = templates::reading_text(band, &reading.subject_id, reading.value);
        let notification = Notification {
            id: self.next_id(),
            subject_id: Some(reading.subject_id.clone()),
            category: NotificationCategory::from(band),
            priority: band.priority(),
            title,
            message,
            created_at: reading.observed_at,
            read: false,
        };
        self.dispatch(&notification);
        Some(notification)
    }

    /// Forget a subject so its next reading bypasses throttling.
    pub fn reset(&mut self, subject_id: &str) -> bool {
        let existed = self.states.remove(subject_id).is_some();
        debug!(subject = %subject_id, existed, "alert state reset");
        existed
    }

    /// Forget every subject and tell the sinks to drop what they hold.
    pub fn clear(&mut self) {
        self.states.clear();
        if !self.disposed {
            self.sinks.notify(|sink| sink.on_cleared());
        }
    }

    // ── Synthesized notifications ────────────────────────────────

    /// Build a notification that bypasses throttling entirely.
    pub fn synthesize(
        &mut self,
        kind: SyntheticKind,
        title: impl Into<String>,
        message: impl Into<String>,
        priority: Priority,
    ) -> Notification {
        self.emit_synthetic(kind, None, title.into(), message.into(), priority)
    }

    /// Band-specific health advice for a reading. Never throttled.
    pub fn health_advisory(&mut self, reading: &Reading) -> Option<Notification> {
        if !reading.value.is_finite() {
            return None;
        }
        let band = AqiBand::classify(reading.value);
        let advice = HealthAdvice::for_band(band);
        let (title, message) = templates::advisory_text(band, &reading.subject_id, &advice);

        Some(self.emit_synthetic(
            SyntheticKind::Health,
            Some(reading.subject_id.clone()),
            title,
            message,
            band.priority(),
        ))
    }

    /// Forecast summary for a subject. `None` when there is nothing to
    /// compare against.
    ///
    /// Priority follows the worst forecast band when the outlook is
    /// worsening and is `Low` otherwise.
    pub fn forecast(
        &mut self,
        subject_id: &str,
        current: f64,
        forecasts: &[f64],
    ) -> Option<Notification> {
        if !current.is_finite() {
            return None;
        }
        let (trend, average) = ForecastTrend::from_outlook(current, forecasts)?;

        let priority = match trend {
            ForecastTrend::Worsening => forecasts
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .map(|v| AqiBand::classify(v).priority())
                .max()
                .unwrap_or(Priority::Low),
            ForecastTrend::Improving | ForecastTrend::Stable => Priority::Low,
        };
        let (title, message) = templates::forecast_text(subject_id, current, average, trend);

        Some(self.emit_synthetic(
            SyntheticKind::Forecast,
            Some(subject_id.to_owned()),
            title,
            message,
            priority,
        ))
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Drop all sinks. Later evaluations return `None`. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.sinks.clear();
        debug!("alert engine disposed");
    }

    fn emit_synthetic(
        &mut self,
        kind: SyntheticKind,
        subject_id: Option<String>,
        title: String,
        message: String,
        priority: Priority,
    ) -> Notification {
        let notification = Notification {
            id: self.next_id(),
            subject_id,
            category: NotificationCategory::from(kind),
            priority,
            title,
            message,
            created_at: Utc::now(),
            read: false,
        };
        self.dispatch(&notification);
        notification
    }

    fn next_id(&mut self) -> String {
        self.sequence += 1;
        format!("aqi-{:08}", self.sequence)
    }

    fn dispatch(&self, notification: &Notification) {
        if self.disposed {
            return;
        }
        self.sinks.notify(|sink| sink.on_notification(notification));
    }
}

fn assert_valid(rule: &AlertRule) {
    if let Err(e) = rule.validate() {
        panic!("{e}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, TimeDelta, TimeZone};
    use pretty_assertions::assert_eq;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 8, 12, 0, 0).unwrap()
    }

    fn at(minutes: i64, value: f64) -> Reading {
        Reading::new("DL-001", value, t0() + TimeDelta::minutes(minutes))
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Notification>>,
        cleared: AtomicUsize,
    }

    impl NotificationSink for Recorder {
        fn on_notification(&self, notification: &Notification) {
            self.seen.lock().unwrap().push(notification.clone());
        }

        fn on_cleared(&self) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }
    }

    // ── Throttling ───────────────────────────────────────────────

    #[test]
    fn fair_then_small_change_then_poor() {
        let mut engine = AlertEngine::default();

        let first = engine.evaluate(&at(0, 85.0)).unwrap();
        assert_eq!(first.category, NotificationCategory::Fair);
        assert_eq!(first.priority, Priority::Low);
        assert_eq!(first.created_at, t0());

        assert!(engine.evaluate(&at(5, 90.0)).is_none());

        let third = engine.evaluate(&at(10, 180.0)).unwrap();
        assert_eq!(third.category, NotificationCategory::Poor);
        assert_eq!(third.priority, Priority::High);
    }

    #[test]
    fn cooldown_suppresses_same_band_swing() {
        let mut engine = AlertEngine::default();
        assert!(engine.evaluate(&at(0, 160.0)).is_some());
        // Delta of 35, still Poor, 10 minutes later.
        assert!(engine.evaluate(&at(10, 195.0)).is_none());
        // Same swing after the cooldown passes.
        assert!(engine.evaluate(&at(30, 195.0)).is_some());
    }

    #[test]
    fn small_delta_never_notifies() {
        let mut engine = AlertEngine::default();
        engine.evaluate(&at(0, 120.0)).unwrap();
        for (minutes, value) in [(60, 139.9), (600, 100.1), (60 * 24 * 7, 120.0)] {
            assert!(engine.evaluate(&at(minutes, value)).is_none(), "{value}");
        }
    }

    #[test]
    fn delta_is_direction_agnostic() {
        let mut engine = AlertEngine::default();
        engine.evaluate(&at(0, 150.0)).unwrap();
        let falling = engine.evaluate(&at(31, 40.0)).unwrap();
        assert_eq!(falling.category, NotificationCategory::Good);
    }

    #[test]
    fn first_reading_per_subject_always_notifies() {
        let mut engine = AlertEngine::default();
        for (i, value) in [0.0, 42.0, 100.0, 151.0, 250.0, 480.0].into_iter().enumerate() {
            let reading = Reading::new(format!("S-{i}"), value, t0());
            assert!(engine.evaluate(&reading).is_some(), "value {value}");
        }
    }

    #[test]
    fn subjects_are_throttled_independently() {
        let mut engine = AlertEngine::default();
        assert!(engine.evaluate(&Reading::new("A", 80.0, t0())).is_some());
        assert!(engine.evaluate(&Reading::new("B", 82.0, t0())).is_some());
        assert!(engine.evaluate(&Reading::new("A", 81.0, t0())).is_none());
    }

    #[test]
    fn suppressed_readings_leave_state_untouched() {
        let mut engine = AlertEngine::default();
        engine.evaluate(&at(0, 85.0)).unwrap();
        engine.evaluate(&at(5, 90.0));

        let state = engine.state("DL-001").unwrap();
        assert_eq!(state.last_notified_value, Some(85.0));
        assert_eq!(state.last_notified_at, Some(t0()));
    }

    #[test]
    fn reset_bypasses_throttling_once() {
        let mut engine = AlertEngine::default();
        engine.evaluate(&at(0, 85.0)).unwrap();
        assert!(engine.evaluate(&at(1, 86.0)).is_none());

        assert!(engine.reset("DL-001"));
        assert!(!engine.reset("DL-001"));
        assert!(engine.evaluate(&at(2, 86.0)).is_some());
        assert!(engine.evaluate(&at(3, 87.0)).is_none());
    }

    #[test]
    fn set_rule_applies_to_later_readings_only() {
        let mut engine = AlertEngine::default();
        engine.evaluate(&at(0, 100.0)).unwrap();
        assert!(engine.evaluate(&at(40, 105.0)).is_none());

        engine.set_rule(AlertRule::new(TimeDelta::minutes(5), 5.0).unwrap());
        let state_before = engine.state("DL-001").cloned();
        assert!(engine.evaluate(&at(41, 105.0)).is_some());
        assert_ne!(engine.state("DL-001").cloned(), state_before);
    }

    #[test]
    #[should_panic(expected = "cooldown must not be negative")]
    fn set_rule_rejects_negative_cooldown() {
        let mut engine = AlertEngine::default();
        engine.set_rule(AlertRule {
            cooldown: TimeDelta::minutes(-5),
            min_delta: 20.0,
        });
    }

    #[test]
    #[should_panic(expected = "min_delta")]
    fn set_rule_rejects_negative_delta() {
        let mut engine = AlertEngine::default();
        engine.set_rule(AlertRule {
            cooldown: TimeDelta::minutes(5),
            min_delta: -1.0,
        });
    }

    #[test]
    fn non_finite_readings_are_ignored() {
        let mut engine = AlertEngine::default();
        assert!(engine.evaluate(&at(0, f64::NAN)).is_none());
        assert!(engine.evaluate(&at(0, f64::INFINITY)).is_none());
        assert!(engine.state("DL-001").is_none());
        assert!(engine.evaluate(&at(0, 60.0)).is_some());
    }

    // ── Ids and sinks ────────────────────────────────────────────

    #[test]
    fn ids_are_unique_and_monotonic() {
        let mut engine = AlertEngine::default();
        let a = engine.evaluate(&at(0, 10.0)).unwrap();
        let b = engine.synthesize(SyntheticKind::Info, "t", "m", Priority::Low);
        let c = engine.evaluate(&Reading::new("other", 10.0, t0())).unwrap();

        assert_eq!(a.id, "aqi-00000001");
        assert_eq!(b.id, "aqi-00000002");
        assert_eq!(c.id, "aqi-00000003");
        assert!(a.id < b.id && b.id < c.id);
    }

    #[test]
    fn sinks_receive_emitted_notifications_only() {
        let mut engine = AlertEngine::default();
        let recorder = Arc::new(Recorder::default());
        engine.subscribe(recorder.clone());

        engine.evaluate(&at(0, 85.0));
        engine.evaluate(&at(5, 90.0));
        engine.evaluate(&at(10, 180.0));
        engine.synthesize(
            SyntheticKind::Success,
            "Connected",
            "Backend reachable",
            Priority::Low,
        );

        let seen = recorder.seen.lock().unwrap();
        let categories: Vec<_> = seen.iter().map(|n| n.category).collect();
        assert_eq!(
            categories,
            vec![
                NotificationCategory::Fair,
                NotificationCategory::Poor,
                NotificationCategory::Success
            ]
        );
    }

    #[test]
    fn read_flag_is_ignored_by_the_engine() {
        let mut engine = AlertEngine::default();
        let mut first = engine.evaluate(&at(0, 85.0)).unwrap();
        first.read = true;

        assert!(engine.evaluate(&at(5, 90.0)).is_none());
        let next = engine.evaluate(&at(10, 180.0)).unwrap();
        assert!(!next.read);
    }

    #[test]
    fn clear_forgets_subjects_and_notifies_sinks() {
        let mut engine = AlertEngine::default();
        let recorder = Arc::new(Recorder::default());
        engine.subscribe(recorder.clone());
        engine.evaluate(&at(0, 85.0)).unwrap();

        engine.clear();

        assert_eq!(recorder.cleared.load(Ordering::SeqCst), 1);
        assert!(engine.state("DL-001").is_none());
        assert!(engine.evaluate(&at(1, 86.0)).is_some());
    }

    #[test]
    fn unsubscribed_sink_hears_nothing() {
        let mut engine = AlertEngine::default();
        let recorder = Arc::new(Recorder::default());
        let id = engine.subscribe(recorder.clone());
        assert!(engine.unsubscribe(id));

        engine.evaluate(&at(0, 85.0)).unwrap();
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn dispose_is_idempotent_and_silences_sinks() {
        let mut engine = AlertEngine::default();
        let recorder = Arc::new(Recorder::default());
        engine.subscribe(recorder.clone());

        engine.dispose();
        engine.dispose();

        assert!(engine.evaluate(&at(0, 85.0)).is_none());
        engine.synthesize(SyntheticKind::Info, "t", "m", Priority::Low);
        engine.clear();

        assert!(recorder.seen.lock().unwrap().is_empty());
        assert_eq!(recorder.cleared.load(Ordering::SeqCst), 0);
    }

    // ── Synthesized ──────────────────────────────────────────────

    #[test]
    fn synthesize_is_never_throttled() {
        let mut engine = AlertEngine::default();
        for _ in 0..3 {
            let n = engine.synthesize(
                SyntheticKind::Health,
                "Stay hydrated",
                "Drink water",
                Priority::Medium,
            );
            assert_eq!(n.category, NotificationCategory::Health);
            assert_eq!(n.subject_id, None);
            assert!(!n.read);
        }
    }

    #[test]
    fn health_advisory_uses_band_priority() {
        let mut engine = AlertEngine::default();
        let n = engine.health_advisory(&at(0, 250.0)).unwrap();
        assert_eq!(n.category, NotificationCategory::Health);
        assert_eq!(n.priority, Priority::Critical);
        assert_eq!(n.subject_id.as_deref(), Some("DL-001"));
        assert!(n.message.contains("N95"));
        // Advisories do not touch throttling memory.
        assert!(engine.state("DL-001").is_none());
    }

    #[test]
    fn forecast_priority_follows_trend() {
        let mut engine = AlertEngine::default();

        let worse = engine.forecast("DL-001", 100.0, &[140.0, 210.0]).unwrap();
        assert_eq!(worse.category, NotificationCategory::Forecast);
        assert_eq!(worse.priority, Priority::Critical);
        assert!(worse.title.contains("worsening"));

        let better = engine.forecast("DL-001", 200.0, &[90.0]).unwrap();
        assert_eq!(better.priority, Priority::Low);
        assert!(better.title.contains("improving"));

        assert!(engine.forecast("DL-001", 100.0, &[]).is_none());
    }
}
