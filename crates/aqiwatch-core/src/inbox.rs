// ── Notification inbox ──
//
// A bounded, reactive notification store usable as a NotificationSink.
// Every mutation rebuilds a newest-first snapshot that subscribers receive
// through a `watch` channel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::model::Notification;
use crate::observer::NotificationSink;

/// Default number of notifications kept before the oldest are dropped.
pub const DEFAULT_INBOX_CAPACITY: usize = 50;

/// Consumer-side notification storage. The `read` flags live here.
pub struct NotificationInbox {
    capacity: usize,
    /// Newest first.
    items: Mutex<VecDeque<Notification>>,
    snapshot: watch::Sender<Arc<Vec<Notification>>>,
}

impl Default for NotificationInbox {
    fn default() -> Self {
        Self::new(DEFAULT_INBOX_CAPACITY)
    }
}

impl NotificationInbox {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::new()),
            snapshot,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current contents, newest first.
    pub fn snapshot(&self) -> Arc<Vec<Notification>> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Notification>>> {
        self.snapshot.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().iter().filter(|n| !n.read).count()
    }

    /// Returns `false` if no notification has this id.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut items = self.lock();
        let Some(item) = items.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if !item.read {
            item.read = true;
            self.publish(&items);
        }
        true
    }

    /// Mark everything read. Returns how many were unread.
    pub fn mark_all_read(&self) -> usize {
        let mut items = self.lock();
        let mut changed = 0;
        for item in items.iter_mut().filter(|n| !n.read) {
            item.read = true;
            changed += 1;
        }
        if changed > 0 {
            self.publish(&items);
        }
        changed
    }

    pub fn remove(&self, id: &str) -> Option<Notification> {
        let mut items = self.lock();
        let index = items.iter().position(|n| n.id == id)?;
        let removed = items.remove(index);
        self.publish(&items);
        removed
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, items: &VecDeque<Notification>) {
        let rebuilt: Vec<Notification> = items.iter().cloned().collect();
        self.snapshot.send_replace(Arc::new(rebuilt));
    }
}

impl NotificationSink for NotificationInbox {
    fn on_notification(&self, notification: &Notification) {
        let mut items = self.lock();
        items.push_front(notification.clone());
        items.truncate(self.capacity);
        self.publish(&items);
    }

    fn on_cleared(&self) {
        let mut items = self.lock();
        items.clear();
        self.publish(&items);
    }
}

impl std::fmt::Debug for NotificationInbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationInbox")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
