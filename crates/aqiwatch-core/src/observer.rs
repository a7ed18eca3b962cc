// ── Observer plumbing ──
//
// Typed listener registries for connection snapshots and notifications.
// Subscriptions are explicit: every `subscribe` hands back an id that
// `unsubscribe` accepts, and `clear` drops them all at dispose time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::{ConnectionSnapshot, Notification};

/// Receives every *actual* connection state change.
pub trait StatusSink: Send + Sync {
    fn on_snapshot(&self, snapshot: &ConnectionSnapshot);
}

impl<F> StatusSink for F
where
    F: Fn(&ConnectionSnapshot) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &ConnectionSnapshot) {
        self(snapshot);
    }
}

/// Receives notifications emitted by an [`AlertEngine`](crate::AlertEngine).
///
/// Storage is the sink's job: the engine never retains what it emits.
pub trait NotificationSink: Send + Sync {
    fn on_notification(&self, notification: &Notification);

    /// The engine forgot all per-subject memory.
    fn on_cleared(&self) {}
}

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registry of shared listeners.
pub struct Observers<T: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(SubscriptionId, Arc<T>)>>,
}

impl<T: ?Sized> Default for Observers<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> Observers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Arc<T>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, listener: Arc<T>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    /// Returns `false` if `id` was not (or no longer) registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Call `f` for every listener registered at the time of the call.
    ///
    /// Iterates a copy of the list, so a listener may unsubscribe itself
    /// (or subscribe others) from inside the callback without deadlocking.
    pub fn notify(&self, mut f: impl FnMut(&T)) {
        let listeners: Vec<Arc<T>> = self.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in &listeners {
            f(listener);
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers").field("len", &self.len()).finish()
    }
}
