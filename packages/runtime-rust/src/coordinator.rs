//! Process-wide lifecycle coordinator.
//!
//! Owns the one instance of each service (registrations, notifications,
//! loading, invalidation routing, push dispatch) and wires the cache
//! observers and the push listener to them. Created once at startup and
//! torn down once with [`Coordinator::shutdown`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::invalidation::{InvalidationConfig, InvalidationRouter};
use crate::loading::LoadingAggregator;
use crate::notifications::NotificationStore;
use crate::observer::{CacheObserver, EffectSink, ObserverScope};
use crate::push::{ConnectionState, PushDispatcher, PushListener, PushTransport};
use crate::registrations::RegistrationRegistry;
use crate::traits::{CredentialProvider, InFlightCounts, OperationRegistry, ReadInvalidator};

pub struct Coordinator {
    config: CoordinatorConfig,
    registrations: Arc<RegistrationRegistry>,
    notifications: NotificationStore,
    loading: Arc<LoadingAggregator>,
    router: Arc<InvalidationRouter>,
    sink: Arc<EffectSink>,
    dispatcher: Arc<PushDispatcher>,
    scope: ObserverScope,
    push: tokio::sync::Mutex<Option<PushListener>>,
    observers_attached: AtomicBool,
    shut_down: AtomicBool,
}

impl Coordinator {
    /// Builds every service. `counts` and `invalidator` are the operation
    /// cache's live counts and read invalidation primitives.
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        counts: Arc<dyn InFlightCounts>,
        invalidator: Arc<dyn ReadInvalidator>,
    ) -> Self {
        let registrations = Arc::new(RegistrationRegistry::new(config.release_mode));
        let notifications = NotificationStore::new(config.notification_ttl);
        let loading = Arc::new(LoadingAggregator::new(counts));
        let router = Arc::new(InvalidationRouter::new(invalidator));
        let sink = Arc::new(EffectSink::new(
            Arc::clone(&loading),
            notifications.clone(),
            Arc::clone(&registrations),
        ));
        let dispatcher = Arc::new(PushDispatcher::new(
            notifications.clone(),
            Arc::clone(&router),
        ));

        Self {
            config,
            registrations,
            notifications,
            loading,
            router,
            sink,
            dispatcher,
            scope: ObserverScope::default(),
            push: tokio::sync::Mutex::new(None),
            observers_attached: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    #[must_use]
    pub fn registrations(&self) -> &Arc<RegistrationRegistry> {
        &self.registrations
    }

    #[must_use]
    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    #[must_use]
    pub fn loading(&self) -> &Arc<LoadingAggregator> {
        &self.loading
    }

    #[must_use]
    pub fn router(&self) -> &Arc<InvalidationRouter> {
        &self.router
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<PushDispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Attaches the read and write observers. The write observer routes
    /// invalidation through `invalidation`. Subscriptions live until
    /// [`shutdown`](Self::shutdown). Only the first call attaches; later
    /// calls are ignored.
    pub fn attach_observers(
        &self,
        reads: &dyn OperationRegistry,
        writes: &dyn OperationRegistry,
        invalidation: InvalidationConfig,
    ) {
        if self.is_shut_down() {
            tracing::warn!("observers not attached: coordinator is shut down");
            return;
        }
        if self.observers_attached.swap(true, Ordering::AcqRel) {
            tracing::warn!("observers not attached: already attached");
            return;
        }
        let read_observer = Arc::new(CacheObserver::read(Arc::clone(&self.sink)));
        let write_observer = Arc::new(CacheObserver::write(
            Arc::clone(&self.sink),
            Arc::clone(&self.router),
            Arc::new(invalidation),
        ));
        self.scope.add(read_observer.attach(reads));
        self.scope.add(write_observer.attach(writes));
        tracing::debug!("cache observers attached");
    }

    /// Starts the push listener for `user_id`, stopping any previous one.
    /// Returns `false` without connecting when `user_id` is empty or the
    /// coordinator is shut down.
    pub async fn connect_push(
        &self,
        user_id: &str,
        transport: Arc<dyn PushTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> bool {
        if user_id.is_empty() {
            tracing::debug!("push channel not started: no user id");
            return false;
        }
        let mut slot = self.push.lock().await;
        if self.is_shut_down() {
            return false;
        }
        if let Some(mut previous) = slot.take() {
            previous.stop().await;
        }
        *slot = Some(PushListener::start(
            self.config.push.clone(),
            user_id,
            transport,
            credentials,
            Arc::clone(&self.dispatcher),
        ));
        true
    }

    /// State of the push listener, if one was started.
    pub async fn push_state(&self) -> Option<ConnectionState> {
        self.push.lock().await.as_ref().map(PushListener::state)
    }

    /// Tears everything down exactly once: cancels observer subscriptions,
    /// stops the push listener and clears pending notifications. Returns
    /// `false` on repeated calls.
    pub async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.scope.close();
        if let Some(mut listener) = self.push.lock().await.take() {
            listener.stop().await;
        }
        self.notifications.clear();
        tracing::info!("coordinator shut down");
        true
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("registrations", &self.registrations)
            .field("notifications", &self.notifications)
            .field("loading", &self.loading)
            .field("observers_attached", &self.observers_attached.load(Ordering::Acquire))
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tidewatch_core::stomp::Command;
    use tidewatch_core::{OperationEvent, OperationKind, OperationPhase};

    use super::*;
    use crate::local_cache::LocalOperationCache;
    use crate::push::{memory_transport, StaticCredentials};

    fn coordinator() -> (Arc<LocalOperationCache>, Coordinator) {
        let cache = Arc::new(LocalOperationCache::new());
        let coordinator = Coordinator::new(CoordinatorConfig::default(), cache.clone(), cache.clone());
        (cache, coordinator)
    }

    #[tokio::test]
    async fn shutdown_runs_once_and_detaches_observers() {
        let (cache, coordinator) = coordinator();
        coordinator.attach_observers(
            cache.registry(OperationKind::Read),
            cache.registry(OperationKind::Write),
            InvalidationConfig::new(),
        );
        assert_eq!(cache.registry(OperationKind::Read).listener_count(), 1);
        assert_eq!(cache.registry(OperationKind::Write).listener_count(), 1);

        assert!(coordinator.shutdown().await);
        assert!(!coordinator.shutdown().await);
        assert_eq!(cache.registry(OperationKind::Read).listener_count(), 0);

        cache.emit(&OperationEvent::write(["account", "post"], OperationPhase::Success));
        assert!(coordinator.notifications().is_empty());
    }

    #[tokio::test]
    async fn second_attach_is_ignored() {
        let (cache, coordinator) = coordinator();
        for _ in 0..2 {
            coordinator.attach_observers(
                cache.registry(OperationKind::Read),
                cache.registry(OperationKind::Write),
                InvalidationConfig::new().with("account", [["accounts"]]),
            );
        }
        assert_eq!(cache.registry(OperationKind::Read).listener_count(), 1);
        assert_eq!(cache.registry(OperationKind::Write).listener_count(), 1);

        cache.emit(&OperationEvent::write(["account", "post"], OperationPhase::Start));
        cache.emit(&OperationEvent::write(["account", "post"], OperationPhase::Success));
        assert_eq!(coordinator.notifications().len(), 1);
        assert_eq!(cache.take_invalidations().len(), 1);

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn attach_after_shutdown_is_ignored() {
        let (cache, coordinator) = coordinator();
        coordinator.shutdown().await;
        coordinator.attach_observers(
            cache.registry(OperationKind::Read),
            cache.registry(OperationKind::Write),
            InvalidationConfig::new(),
        );
        assert_eq!(cache.registry(OperationKind::Read).listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn push_requires_user_id() {
        let (_cache, coordinator) = coordinator();
        let (transport, _broker) = memory_transport();
        let started = coordinator
            .connect_push("", Arc::new(transport), Arc::new(StaticCredentials::anonymous()))
            .await;
        assert!(!started);
        assert!(coordinator.push_state().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_push_listener() {
        let (_cache, coordinator) = coordinator();
        let (transport, mut broker) = memory_transport();
        assert!(
            coordinator
                .connect_push("u-1", Arc::new(transport), Arc::new(StaticCredentials::bearer("t")))
                .await
        );
        let mut session = broker.accept().await.unwrap();
        session.handshake().await.unwrap();

        coordinator.shutdown().await;
        assert!(coordinator.push_state().await.is_none());
        let frame = session.recv_frame().await.unwrap();
        assert_eq!(frame.command, Command::Disconnect);
    }
}
