// ── Connection manager ──
//
// Authoritative, observable state for the API and realtime channels.
// Connectivity failures are folded into channel state with a reason
// string; nothing here returns an error for a backend being down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aqiwatch_api::RealtimeEvent;

use crate::backend::{HealthCheck, Realtime};
use crate::config::ManagerConfig;
use crate::error::CoreError;
use crate::model::{Channel, ChannelState, ConnectionSnapshot, OverallStatus, Subject};
use crate::observer::{Observers, StatusSink, SubscriptionId};
use crate::retry::calculate_backoff;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── ConnectionManager ────────────────────────────────────────────

/// Tracks and drives the two backend channels.
///
/// Cheaply cloneable via `Arc<ManagerInner>`; every clone is a handle to
/// the same state. After [`dispose`](Self::dispose) every operation is a
/// no-op and no [`StatusSink`] is ever called again.
pub struct ConnectionManager<H, R> {
    inner: Arc<ManagerInner<H, R>>,
}

impl<H, R> Clone for ConnectionManager<H, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ManagerInner<H, R> {
    config: ManagerConfig,
    health: H,
    realtime: R,
    snapshot: watch::Sender<ConnectionSnapshot>,
    observers: Observers<dyn StatusSink>,
    /// Taken by the signal listener the first time realtime connects.
    /// Subscribed at construction so no early signal is missed.
    realtime_signals: Mutex<Option<broadcast::Receiver<RealtimeEvent>>>,
    cancel: CancellationToken,
    /// Cancels the owned retry loop only; replaced on every restart.
    retry_cancel: Mutex<Option<CancellationToken>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl<H: HealthCheck, R: Realtime> ConnectionManager<H, R> {
    pub fn new(health: H, realtime: R, config: ManagerConfig) -> Self {
        let signals = realtime.signals();
        Self {
            inner: Arc::new(ManagerInner {
                config,
                health,
                realtime,
                snapshot: watch::Sender::new(ConnectionSnapshot::initial(Utc::now())),
                observers: Observers::new(),
                realtime_signals: Mutex::new(Some(signals)),
                cancel: CancellationToken::new(),
                retry_cancel: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    // ── Observation ──────────────────────────────────────────────

    /// Current snapshot. Pure read.
    pub fn current_snapshot(&self) -> ConnectionSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn overall(&self) -> OverallStatus {
        self.inner.snapshot.borrow().overall()
    }

    /// Register a sink for every actual state change.
    pub fn subscribe(&self, sink: Arc<dyn StatusSink>) -> SubscriptionId {
        self.inner.observers.subscribe(sink)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    /// Pull-style view of the same snapshots the sinks receive.
    pub fn watch(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    // ── Operations ───────────────────────────────────────────────

    /// Probe the API and open the realtime stream concurrently.
    pub async fn initialize(&self) {
        if self.is_disposed() {
            return;
        }
        info!("initializing backend connections");
        tokio::join!(self.check_api_health(), self.connect_realtime());
    }

    /// One health probe, bounded by `health_timeout`.
    ///
    /// Returns whether the API is healthy. The API channel goes straight to
    /// `Connected` or `Error`; a probe never passes through `Connecting`.
    pub async fn check_api_health(&self) -> bool {
        if self.is_disposed() {
            return false;
        }

        let probe = tokio::time::timeout(
            self.inner.config.health_timeout,
            self.inner.health.check_health(),
        );
        let outcome = tokio::select! {
            () = self.inner.cancel.cancelled() => return false,
            outcome = probe => outcome,
        };

        match outcome {
            Ok(Ok(())) => {
                self.inner
                    .transition(Channel::Api, ChannelState::Connected, None);
                true
            }
            Ok(Err(e)) => {
                self.inner
                    .transition(Channel::Api, ChannelState::Error, Some(e.reason()));
                false
            }
            Err(_) => {
                self.inner.transition(
                    Channel::Api,
                    ChannelState::Error,
                    Some(CoreError::Timeout.reason()),
                );
                false
            }
        }
    }

    /// Ask the realtime collaborator to open a stream.
    ///
    /// `realtime` becomes `Connecting` before the collaborator is called.
    /// Resolves once the collaborator reports an outcome, or after
    /// `connect_timeout`, at which point a still-pending attempt is
    /// marked `Error` with reason "timeout".
    pub async fn connect_realtime(&self) {
        if self.is_disposed() {
            return;
        }
        self.ensure_signal_listener();

        let mut rx = self.inner.snapshot.subscribe();
        self.inner
            .transition(Channel::Realtime, ChannelState::Connecting, None);
        self.inner.realtime.connect();

        let settled = async {
            rx.wait_for(|s| s.realtime_state != ChannelState::Connecting)
                .await
                .map(|_| ())
        };
        let waited = tokio::select! {
            () = self.inner.cancel.cancelled() => return,
            waited = tokio::time::timeout(self.inner.config.connect_timeout, settled) => waited,
        };

        if waited.is_err()
            && self.inner.transition_if(
                Channel::Realtime,
                ChannelState::Connecting,
                ChannelState::Error,
                Some(CoreError::Timeout.reason()),
            )
        {
            // The handshake may still be running; its outcome is stale now.
            self.inner.realtime.disconnect();
        }
    }

    /// Re-probe the API and, unless already connected, reconnect realtime.
    pub async fn retry(&self) {
        if self.is_disposed() {
            return;
        }
        debug!("retrying backend connections");
        let realtime = async {
            if !self.current_snapshot().realtime_state.is_connected() {
                self.connect_realtime().await;
            }
        };
        tokio::join!(self.check_api_health(), realtime);
    }

    /// Subscribe the realtime stream to a subject.
    ///
    /// Only valid while realtime is `Connected`; otherwise logs a warning
    /// and does nothing.
    pub fn subscribe_to_subject(&self, subject: &Subject) {
        if self.is_disposed() {
            return;
        }
        if !self.current_snapshot().realtime_state.is_connected() {
            warn!(subject = %subject, "realtime channel not connected, subscription skipped");
            return;
        }

        let result = match subject {
            Subject::Station(id) => self.inner.realtime.subscribe_to_station(id),
            Subject::Location { lat, lon } => self.inner.realtime.subscribe_to_location(*lat, *lon),
        };
        match result {
            Ok(()) => debug!(subject = %subject, "subscribed"),
            Err(e) => warn!(subject = %subject, error = %e, "subscription failed"),
        }
    }

    /// Drop every realtime subscription. Same preconditions as
    /// [`subscribe_to_subject`](Self::subscribe_to_subject).
    pub fn unsubscribe_all(&self) {
        if self.is_disposed() {
            return;
        }
        if !self.current_snapshot().realtime_state.is_connected() {
            warn!("realtime channel not connected, unsubscribe skipped");
            return;
        }
        if let Err(e) = self.inner.realtime.unsubscribe_all() {
            warn!(error = %e, "unsubscribe failed");
        }
    }

    // ── Owned retry scheduler ────────────────────────────────────

    /// Spawn the background retry loop, replacing any running one.
    ///
    /// While not every channel is connected it calls [`retry`](Self::retry)
    /// with exponential backoff; once all are connected it re-probes API
    /// health every `check_interval`.
    pub fn start_auto_retry(&self) {
        if self.is_disposed() {
            return;
        }
        let token = self.inner.cancel.child_token();
        if let Some(previous) = lock(&self.inner.retry_cancel).replace(token.clone()) {
            previous.cancel();
        }

        let manager = self.clone();
        let handle = tokio::spawn(auto_retry_task(manager, token));
        let mut handles = lock(&self.inner.task_handles);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        info!("auto-retry started");
    }

    pub fn stop_auto_retry(&self) {
        if let Some(token) = lock(&self.inner.retry_cancel).take() {
            token.cancel();
            info!("auto-retry stopped");
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Release the realtime collaborator, stop every background task and
    /// drop all sinks. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.cancel.cancel();
        lock(&self.inner.retry_cancel).take();
        for handle in lock(&self.inner.task_handles).drain(..) {
            handle.abort();
        }
        self.inner.realtime.dispose();
        self.inner.observers.clear();
        info!("connection manager disposed");
    }

    fn ensure_signal_listener(&self) {
        let Some(signals) = lock(&self.inner.realtime_signals).take() else {
            return;
        };
        let manager = self.clone();
        let cancel = self.inner.cancel.clone();
        let handle = tokio::spawn(signal_listener_task(manager, signals, cancel));
        lock(&self.inner.task_handles).push(handle);
    }
}

// ── State transitions ────────────────────────────────────────────

impl<H, R> ManagerInner<H, R> {
    fn transition(&self, channel: Channel, next: ChannelState, reason: Option<String>) -> bool {
        self.apply(channel, |_| true, next, reason)
    }

    /// Transition only if the channel is currently in `expected`.
    fn transition_if(
        &self,
        channel: Channel,
        expected: ChannelState,
        next: ChannelState,
        reason: Option<String>,
    ) -> bool {
        self.apply(channel, |current| current == expected, next, reason)
    }

    /// The single mutation point for channel state.
    ///
    /// Sinks and watch receivers hear about it only when the channel's
    /// state actually changed. `last_checked_at` and the error reasons are
    /// refreshed either way. A channel's reason is cleared only when that
    /// channel connects.
    fn apply(
        &self,
        channel: Channel,
        guard: impl Fn(ChannelState) -> bool,
        next: ChannelState,
        reason: Option<String>,
    ) -> bool {
        if self.disposed.load(Ordering::SeqCst) {
            return false;
        }

        let mut emitted = None;
        self.snapshot.send_if_modified(|snapshot| {
            let previous = snapshot.state(channel);
            if !guard(previous) {
                return false;
            }

            snapshot.last_checked_at = Utc::now();
            match next {
                ChannelState::Error => {
                    let reason = reason.unwrap_or_else(|| "unknown error".into());
                    *snapshot.error_mut(channel) = Some(reason.clone());
                    snapshot.last_error = Some(reason);
                }
                ChannelState::Connected => {
                    *snapshot.error_mut(channel) = None;
                    // Only this channel recovered; keep the other one's reason.
                    let other = channel.other();
                    snapshot.last_error = if snapshot.state(other) == ChannelState::Error {
                        snapshot.error(other).map(str::to_owned)
                    } else {
                        None
                    };
                }
                ChannelState::Connecting | ChannelState::Disconnected => {}
            }
            *snapshot.state_mut(channel) = next;

            let changed = previous != next;
            if changed {
                emitted = Some((previous, snapshot.clone()));
            }
            changed
        });

        let Some((previous, snapshot)) = emitted else {
            return false;
        };

        match next {
            ChannelState::Connected => {
                info!(channel = %channel, from = %previous, overall = %snapshot.overall(), "channel connected");
            }
            ChannelState::Error => {
                let reason = snapshot.last_error.as_deref().unwrap_or_default();
                warn!(channel = %channel, from = %previous, reason = %reason, "channel failed");
            }
            ChannelState::Connecting | ChannelState::Disconnected => {
                debug!(channel = %channel, from = %previous, to = %next, "channel transition");
            }
        }

        self.observers.notify(|sink| sink.on_snapshot(&snapshot));
        true
    }

    fn on_realtime_event(&self, event: RealtimeEvent) {
        match event {
            RealtimeEvent::Connected => {
                self.transition(Channel::Realtime, ChannelState::Connected, None);
            }
            RealtimeEvent::Disconnected => {
                self.transition_if(
                    Channel::Realtime,
                    ChannelState::Connected,
                    ChannelState::Disconnected,
                    None,
                );
            }
            RealtimeEvent::Error(reason) => {
                self.transition(Channel::Realtime, ChannelState::Error, Some(reason));
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Bridge realtime lifecycle signals into channel transitions.
async fn signal_listener_task<H: HealthCheck, R: Realtime>(
    manager: ConnectionManager<H, R>,
    mut signals: broadcast::Receiver<RealtimeEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = signals.recv() => match result {
                Ok(event) => manager.inner.on_realtime_event(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "realtime signal listener lagged");
                    // Resynchronize from the collaborator's own view.
                    let event = if manager.inner.realtime.is_connected() {
                        RealtimeEvent::Connected
                    } else {
                        RealtimeEvent::Disconnected
                    };
                    manager.inner.on_realtime_event(event);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    debug!("realtime signal listener stopped");
}

async fn auto_retry_task<H: HealthCheck, R: Realtime>(
    manager: ConnectionManager<H, R>,
    cancel: CancellationToken,
) {
    let policy = manager.inner.config.retry.clone();
    let mut attempt: u32 = 0;

    loop {
        let delay = if manager.overall() == OverallStatus::AllConnected {
            attempt = 0;
            policy.check_interval
        } else {
            calculate_backoff(attempt, &policy)
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        if manager.overall() == OverallStatus::AllConnected {
            debug!("periodic liveness probe");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = manager.check_api_health() => {}
            }
        } else {
            attempt = attempt.saturating_add(1);
            debug!(attempt, "scheduled retry");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = manager.retry() => {}
            }
        }
    }
    debug!("auto-retry loop exited");
}
