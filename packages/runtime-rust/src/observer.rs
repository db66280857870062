//! Cache event observers.
//!
//! A [`CacheObserver`] is attached to one operation registry and turns each
//! lifecycle event into side effects through a shared [`EffectSink`]. The
//! write observer additionally routes key-based invalidation on success.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tidewatch_core::{
    classify, Effect, LifecycleFault, OperationEvent, OperationKind, OperationPhase,
};

use crate::invalidation::{InvalidationConfig, InvalidationRouter};
use crate::loading::LoadingAggregator;
use crate::notifications::NotificationStore;
use crate::registrations::RegistrationRegistry;
use crate::subscription::Subscription;
use crate::traits::{EventListener, OperationRegistry};

// ---------------------------------------------------------------------------
// EffectSink
// ---------------------------------------------------------------------------

/// Classifies events and applies the resulting effects.
pub struct EffectSink {
    loading: Arc<LoadingAggregator>,
    notifications: NotificationStore,
    registrations: Arc<RegistrationRegistry>,
}

impl EffectSink {
    #[must_use]
    pub fn new(
        loading: Arc<LoadingAggregator>,
        notifications: NotificationStore,
        registrations: Arc<RegistrationRegistry>,
    ) -> Self {
        Self {
            loading,
            notifications,
            registrations,
        }
    }

    /// Classifies `event` and applies its effect. Returns the applied effect.
    ///
    /// Registrations are only consulted for write events.
    pub fn handle(&self, event: &OperationEvent) -> Effect {
        let registration = match event.kind {
            OperationKind::Write => self.registrations.lookup(&event.key),
            OperationKind::Read => None,
        };
        let effect = classify(event, registration.as_ref());
        tracing::debug!(
            kind = event.kind.as_str(),
            key = %event.key,
            phase = event.phase.name(),
            set_loading = ?effect.set_loading,
            notify = effect.notification.is_some(),
            "lifecycle event classified"
        );
        self.apply(&effect);
        effect
    }

    fn apply(&self, effect: &Effect) {
        if let Some(value) = effect.set_loading {
            self.loading.set_loading(value);
        }
        if let Some(request) = &effect.notification {
            self.notifications.enqueue(request.clone());
        }
        if let Some(fault) = &effect.fault {
            log_fault(fault);
        }
    }
}

impl fmt::Debug for EffectSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectSink")
            .field("loading", &self.loading)
            .field("notifications", &self.notifications)
            .field("registrations", &self.registrations)
            .finish()
    }
}

fn log_fault(fault: &LifecycleFault) {
    match fault {
        LifecycleFault::Authentication { key } => {
            tracing::warn!(%key, "operation rejected: not authenticated");
        }
        LifecycleFault::Connectivity { key } => {
            tracing::warn!(%key, "operation paused: no connectivity");
        }
        LifecycleFault::Operation { key, error } => {
            tracing::error!(
                %key,
                status = ?error.status_code,
                message = ?error.message,
                content = ?error.content,
                "operation failed"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// CacheObserver
// ---------------------------------------------------------------------------

struct WriteInvalidation {
    router: Arc<InvalidationRouter>,
    config: Arc<InvalidationConfig>,
}

/// Standing observer for one registry.
pub struct CacheObserver {
    kind: OperationKind,
    sink: Arc<EffectSink>,
    invalidation: Option<WriteInvalidation>,
}

impl CacheObserver {
    /// Observer for the read registry.
    #[must_use]
    pub fn read(sink: Arc<EffectSink>) -> Self {
        Self {
            kind: OperationKind::Read,
            sink,
            invalidation: None,
        }
    }

    /// Observer for the write registry. On `success` it invalidates the
    /// read prefixes `config` lists for the write key's domain.
    #[must_use]
    pub fn write(
        sink: Arc<EffectSink>,
        router: Arc<InvalidationRouter>,
        config: Arc<InvalidationConfig>,
    ) -> Self {
        Self {
            kind: OperationKind::Write,
            sink,
            invalidation: Some(WriteInvalidation { router, config }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Handles one event.
    pub fn on_event(&self, event: &OperationEvent) {
        self.sink.handle(event);

        if event.kind != OperationKind::Write || event.phase != OperationPhase::Success {
            return;
        }
        let (Some(invalidation), Some(domain)) = (&self.invalidation, event.key.domain()) else {
            return;
        };
        invalidation.router.invalidate(domain, &invalidation.config);
    }

    /// Subscribes this observer to `registry`.
    pub fn attach(self: Arc<Self>, registry: &dyn OperationRegistry) -> Subscription {
        if registry.kind() != self.kind {
            tracing::warn!(
                observer = self.kind.as_str(),
                registry = registry.kind().as_str(),
                "observer attached to a registry of another kind"
            );
        }
        let listener: EventListener = Arc::new(move |event: &OperationEvent| self.on_event(event));
        registry.subscribe(listener)
    }
}

impl fmt::Debug for CacheObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheObserver")
            .field("kind", &self.kind)
            .field("invalidates", &self.invalidation.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ObserverScope
// ---------------------------------------------------------------------------

/// Owns the subscriptions of the attached observers.
///
/// Closing cancels every subscription exactly once; dropping the scope
/// closes it.
#[derive(Debug, Default)]
pub struct ObserverScope {
    subscriptions: Mutex<Vec<Subscription>>,
    closed: AtomicBool,
}

impl ObserverScope {
    #[must_use]
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self {
            subscriptions: Mutex::new(subscriptions),
            closed: AtomicBool::new(false),
        }
    }

    /// Adds a subscription. A closed scope cancels it immediately.
    pub fn add(&self, subscription: Subscription) {
        if self.is_closed() {
            subscription.cancel();
            return;
        }
        self.subscriptions.lock().push(subscription);
    }

    /// Cancels every subscription. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in &subscriptions {
            subscription.cancel();
        }
        tracing::debug!(cancelled = subscriptions.len(), "observer scope closed");
        true
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for ObserverScope {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
