//! In-process operation cache.
//!
//! Provides both registries, live in-flight counts and a log of invalidation
//! requests. Embedders whose operation layer lives elsewhere feed its
//! transitions in through [`LocalOperationCache::emit`] or
//! [`LocalOperationCache::emit_raw`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tidewatch_core::{
    normalize, CacheNotification, OperationEvent, OperationKey, OperationKind, OperationPhase,
};

use crate::subscription::EventBus;
use crate::traits::{InFlightCounts, ReadInvalidator};

/// An invalidation the cache was asked to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationRequest {
    Prefix(OperationKey),
    All,
}

pub struct LocalOperationCache {
    reads: EventBus,
    writes: EventBus,
    in_flight_reads: AtomicUsize,
    in_flight_writes: AtomicUsize,
    invalidations: Mutex<Vec<InvalidationRequest>>,
}

impl LocalOperationCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            reads: EventBus::new(OperationKind::Read),
            writes: EventBus::new(OperationKind::Write),
            in_flight_reads: AtomicUsize::new(0),
            in_flight_writes: AtomicUsize::new(0),
            invalidations: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn registry(&self, kind: OperationKind) -> &EventBus {
        match kind {
            OperationKind::Read => &self.reads,
            OperationKind::Write => &self.writes,
        }
    }

    /// Records the transition in the in-flight counts, then publishes it on
    /// the registry of the event's kind.
    pub fn emit(&self, event: &OperationEvent) {
        let counter = match event.kind {
            OperationKind::Read => &self.in_flight_reads,
            OperationKind::Write => &self.in_flight_writes,
        };
        match event.phase {
            OperationPhase::Start | OperationPhase::Resumed => {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            OperationPhase::Success | OperationPhase::Error(_) | OperationPhase::Paused => {
                let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    Some(n.saturating_sub(1))
                });
            }
            OperationPhase::RetryFailed | OperationPhase::Invalidated | OperationPhase::Unknown => {}
        }
        self.registry(event.kind).publish(event);
    }

    /// Normalizes a raw notification and emits it. Returns `false` when the
    /// notification carries no lifecycle transition.
    pub fn emit_raw(&self, kind: OperationKind, notification: CacheNotification) -> bool {
        match normalize(kind, notification) {
            Some(event) => {
                self.emit(&event);
                true
            }
            None => false,
        }
    }

    /// Invalidation requests received so far, oldest first.
    #[must_use]
    pub fn invalidations(&self) -> Vec<InvalidationRequest> {
        self.invalidations.lock().clone()
    }

    pub fn take_invalidations(&self) -> Vec<InvalidationRequest> {
        std::mem::take(&mut *self.invalidations.lock())
    }
}

impl Default for LocalOperationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlightCounts for LocalOperationCache {
    fn in_flight_reads(&self) -> usize {
        self.in_flight_reads.load(Ordering::SeqCst)
    }

    fn in_flight_writes(&self) -> usize {
        self.in_flight_writes.load(Ordering::SeqCst)
    }
}

impl ReadInvalidator for LocalOperationCache {
    fn invalidate(&self, prefix: &OperationKey) {
        tracing::trace!(%prefix, "read prefix invalidated");
        self.invalidations
            .lock()
            .push(InvalidationRequest::Prefix(prefix.clone()));
    }

    fn invalidate_all(&self) {
        tracing::trace!("all reads invalidated");
        self.invalidations.lock().push(InvalidationRequest::All);
    }
}

impl fmt::Debug for LocalOperationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalOperationCache")
            .field("in_flight_reads", &self.in_flight_reads())
            .field("in_flight_writes", &self.in_flight_writes())
            .field("invalidations", &self.invalidations.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tidewatch_core::{CacheAction, ErrorDescriptor, NotifyType};

    use super::*;
    use crate::traits::OperationRegistry;

    #[test]
    fn counts_track_lifecycle() {
        let cache = LocalOperationCache::new();
        cache.emit(&OperationEvent::read(["accounts"], OperationPhase::Start));
        cache.emit(&OperationEvent::write(["account", "post"], OperationPhase::Start));
        assert_eq!(cache.in_flight_reads(), 1);
        assert_eq!(cache.in_flight_writes(), 1);

        cache.emit(&OperationEvent::write(
            ["account", "post"],
            OperationPhase::Error(ErrorDescriptor::default()),
        ));
        cache.emit(&OperationEvent::read(["accounts"], OperationPhase::Paused));
        assert_eq!(cache.in_flight_reads(), 0);
        assert_eq!(cache.in_flight_writes(), 0);

        cache.emit(&OperationEvent::read(["accounts"], OperationPhase::Resumed));
        assert_eq!(cache.in_flight_reads(), 1);
    }

    #[test]
    fn counts_never_underflow() {
        let cache = LocalOperationCache::new();
        cache.emit(&OperationEvent::read(["accounts"], OperationPhase::Success));
        assert_eq!(cache.in_flight_reads(), 0);
    }

    #[test]
    fn counts_are_updated_before_listeners_run() {
        let cache = Arc::new(LocalOperationCache::new());
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let probe = Arc::clone(&cache);
        let seen_in_listener = Arc::clone(&seen);
        let _sub = cache.registry(OperationKind::Read).subscribe(Arc::new(
            move |_: &OperationEvent| {
                seen_in_listener.store(probe.in_flight_reads(), Ordering::SeqCst);
            },
        ));

        cache.emit(&OperationEvent::read(["accounts"], OperationPhase::Start));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_raw_normalizes() {
        let cache = LocalOperationCache::new();
        let fetch = CacheNotification {
            notify: NotifyType::Updated,
            key: OperationKey::from(["accounts"]),
            action: Some(CacheAction::Fetch),
        };
        assert!(cache.emit_raw(OperationKind::Read, fetch));
        assert_eq!(cache.in_flight_reads(), 1);

        let added = CacheNotification {
            notify: NotifyType::Added,
            key: OperationKey::from(["accounts"]),
            action: None,
        };
        assert!(!cache.emit_raw(OperationKind::Read, added));
    }

    #[test]
    fn invalidations_are_logged_in_order() {
        let cache = LocalOperationCache::new();
        cache.invalidate(&OperationKey::from(["accounts"]));
        cache.invalidate_all();
        assert_eq!(
            cache.take_invalidations(),
            vec![
                InvalidationRequest::Prefix(OperationKey::from(["accounts"])),
                InvalidationRequest::All
            ]
        );
        assert!(cache.invalidations().is_empty());
    }
}
