//! Typed publish/subscribe with idempotent cancellation handles.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tidewatch_core::{OperationEvent, OperationKind};

use crate::traits::{EventListener, OperationRegistry};

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle to a standing subscription.
///
/// `cancel()` runs the release action at most once; later calls and the
/// implicit cancel on drop are no-ops.
pub struct Subscription {
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// A handle with nothing to release.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            release: Mutex::new(None),
        }
    }

    /// Stops delivery. Returns `true` only for the call that actually released.
    pub fn cancel(&self) -> bool {
        let release = self.release.lock().take();
        match release {
            Some(release) => {
                release();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.release.lock().is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

struct BusInner {
    listeners: RwLock<BTreeMap<u64, EventListener>>,
    next_id: AtomicU64,
}

/// In-process event stream for one operation kind.
///
/// Listeners are called in subscription order on the publishing task. The
/// listener set is snapshotted before delivery, so a listener may subscribe
/// or cancel without deadlocking.
#[derive(Clone)]
pub struct EventBus {
    kind: OperationKind,
    inner: Arc<BusInner>,
}

impl EventBus {
    #[must_use]
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            inner: Arc::new(BusInner {
                listeners: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Delivers `event` to every current listener.
    pub fn publish(&self, event: &OperationEvent) {
        let listeners: Vec<EventListener> = self.inner.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

impl OperationRegistry for EventBus {
    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn subscribe(&self, listener: EventListener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().insert(id, listener);

        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.write().remove(&id);
            }
        })
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("kind", &self.kind)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
