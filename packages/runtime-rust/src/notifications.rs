//! Notification store with auto-dismiss timers.
//!
//! Entries are kept in insertion order inside a `watch` channel so view
//! layers can observe the whole sequence. Non-error entries schedule a
//! removal task on the current tokio runtime; error entries stay until
//! dismissed.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use tidewatch_core::{NotificationRequest, Severity};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Delay after which non-error notifications are removed.
pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_millis(5000);

/// Unique identity of a stored notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NotificationId(Uuid);

impl NotificationId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A pending notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub severity: Severity,
    /// Unix time in milliseconds.
    pub created_at_ms: u64,
}

struct StoreInner {
    entries: watch::Sender<Vec<Notification>>,
    timers: Mutex<HashMap<NotificationId, AbortHandle>>,
    ttl: Duration,
}

impl StoreInner {
    fn remove_entry(&self, id: NotificationId) -> bool {
        self.entries.send_if_modified(|entries| {
            let before = entries.len();
            entries.retain(|n| n.id != id);
            entries.len() != before
        })
    }

    fn expire(&self, id: NotificationId) {
        self.timers.lock().remove(&id);
        if self.remove_entry(id) {
            tracing::trace!(%id, "notification auto-dismissed");
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        for (_, timer) in self.timers.get_mut().drain() {
            timer.abort();
        }
    }
}

/// Ordered store of pending notifications. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct NotificationStore {
    inner: Arc<StoreInner>,
}

impl NotificationStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let (entries, _rx) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(StoreInner {
                entries,
                timers: Mutex::new(HashMap::new()),
                ttl,
            }),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Appends a notification and, unless it is an error, schedules its removal.
    ///
    /// Auto-removal needs a tokio runtime; outside one the entry stays until
    /// dismissed.
    pub fn enqueue(&self, request: NotificationRequest) -> NotificationId {
        let notification = Notification {
            id: NotificationId::generate(),
            message: request.message,
            severity: request.severity,
            created_at_ms: now_ms(),
        };
        let id = notification.id;
        let severity = notification.severity;

        tracing::debug!(%id, %severity, message = %notification.message, "notification enqueued");
        self.inner.entries.send_modify(|entries| entries.push(notification));

        if severity.auto_dismisses() {
            self.schedule_removal(id);
        }
        id
    }

    fn schedule_removal(&self, id: NotificationId) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%id, "no tokio runtime; notification will not auto-dismiss");
            return;
        };
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let ttl = self.inner.ttl;

        // Hold the timer map while spawning so the task cannot expire the
        // entry before its handle is recorded.
        let mut timers = self.inner.timers.lock();
        let task = runtime.spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(id);
            }
        });
        timers.insert(id, task.abort_handle());
    }

    /// Removes by identity and cancels any pending timer.
    /// Returns `false` if no such entry exists.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        if let Some(timer) = self.inner.timers.lock().remove(&id) {
            timer.abort();
        }
        let removed = self.inner.remove_entry(id);
        if removed {
            tracing::trace!(%id, "notification dismissed");
        }
        removed
    }

    /// Current sequence, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Notification> {
        self.inner.entries.borrow().clone()
    }

    /// Newest pending notification.
    #[must_use]
    pub fn latest(&self) -> Option<Notification> {
        self.inner.entries.borrow().last().cloned()
    }

    /// Removes and returns the newest pending notification.
    pub fn take_latest(&self) -> Option<Notification> {
        let latest = self.latest()?;
        self.dismiss(latest.id);
        Some(latest)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Receiver notified whenever the sequence changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.inner.entries.subscribe()
    }

    /// Drops every entry and cancels every timer.
    pub fn clear(&self) {
        for (_, timer) in self.inner.timers.lock().drain() {
            timer.abort();
        }
        self.inner.entries.send_if_modified(|entries| {
            let had_entries = !entries.is_empty();
            entries.clear();
            had_entries
        });
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_TTL)
    }
}

impl fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationStore")
            .field("pending", &self.len())
            .field("ttl", &self.inner.ttl)
            .finish()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
