//! End-to-end flows through the coordinator, the in-process operation cache
//! and the in-memory push transport.

use std::sync::Arc;
use std::time::Duration;

use tidewatch_core::{
    CacheAction, CacheNotification, ErrorDescriptor, NotifyType, OperationEvent, OperationKey,
    OperationKind, OperationPhase, RegistrationFlags, Severity,
};
use tidewatch_runtime::push::{memory_transport, StaticCredentials};
use tidewatch_runtime::{
    Coordinator, CoordinatorConfig, InvalidationConfig, InvalidationRequest, LocalOperationCache,
};

fn setup(invalidation: InvalidationConfig) -> (Arc<LocalOperationCache>, Coordinator) {
    let cache = Arc::new(LocalOperationCache::new());
    let coordinator = Coordinator::new(CoordinatorConfig::default(), cache.clone(), cache.clone());
    coordinator.attach_observers(
        cache.registry(OperationKind::Read),
        cache.registry(OperationKind::Write),
        invalidation,
    );
    (cache, coordinator)
}

fn write_key() -> OperationKey {
    OperationKey::from(["account", "post"])
}

#[tokio::test]
async fn write_success_without_registration_notifies() {
    let (cache, coordinator) = setup(InvalidationConfig::new());

    cache.emit(&OperationEvent::write(write_key(), OperationPhase::Start));
    assert!(coordinator.loading().is_loading());

    cache.emit(&OperationEvent::write(write_key(), OperationPhase::Success));
    assert!(!coordinator.loading().is_loading());

    let notification = coordinator.notifications().latest().unwrap();
    assert_eq!(notification.message, "Action Successful");
    assert_eq!(notification.severity, Severity::Success);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn read_error_notifies_with_message() {
    let (cache, coordinator) = setup(InvalidationConfig::new());

    cache.emit(&OperationEvent::read(["accounts"], OperationPhase::Start));
    cache.emit(&OperationEvent::read(
        ["accounts"],
        OperationPhase::Error(ErrorDescriptor::with_status(500, "db down")),
    ));

    assert!(!coordinator.loading().is_loading());
    let notification = coordinator.notifications().latest().unwrap();
    assert_eq!(notification.message, "db down");
    assert_eq!(notification.severity, Severity::Error);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn registered_write_success_is_silent() {
    let (cache, coordinator) = setup(InvalidationConfig::new());
    let guard = coordinator
        .registrations()
        .acquire(write_key(), RegistrationFlags::none().success(true));

    cache.emit(&OperationEvent::write(write_key(), OperationPhase::Start));
    cache.emit(&OperationEvent::write(write_key(), OperationPhase::Success));
    assert!(coordinator.notifications().is_empty());

    // Once the call site releases, the default notification returns.
    drop(guard);
    cache.emit(&OperationEvent::write(write_key(), OperationPhase::Start));
    cache.emit(&OperationEvent::write(write_key(), OperationPhase::Success));
    assert_eq!(coordinator.notifications().len(), 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn unauthenticated_write_ignores_payload_and_suppression() {
    let (cache, coordinator) = setup(InvalidationConfig::new());
    let _guard = coordinator
        .registrations()
        .acquire(write_key(), RegistrationFlags::custom_messages(true, true));

    cache.emit(&OperationEvent::write(write_key(), OperationPhase::Start));
    cache.emit(&OperationEvent::write(
        write_key(),
        OperationPhase::Error(ErrorDescriptor {
            status_code: Some(401),
            message: Some("jwt expired".to_string()),
            content: Some("Unauthorized".to_string()),
        }),
    ));

    let messages: Vec<_> = coordinator
        .notifications()
        .snapshot()
        .into_iter()
        .map(|n| n.message)
        .collect();
    assert_eq!(messages, ["You are not authenticated"]);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn write_success_invalidates_configured_prefixes() {
    let (cache, coordinator) =
        setup(InvalidationConfig::new().with("account", [["accounts"]]));

    cache.emit(&OperationEvent::write(write_key(), OperationPhase::Start));
    cache.emit(&OperationEvent::write(write_key(), OperationPhase::Success));
    assert_eq!(
        cache.take_invalidations(),
        vec![InvalidationRequest::Prefix(OperationKey::from(["accounts"]))]
    );

    // A domain missing from the config invalidates nothing.
    cache.emit(&OperationEvent::write(["asset", "post"], OperationPhase::Start));
    cache.emit(&OperationEvent::write(["asset", "post"], OperationPhase::Success));
    assert!(cache.take_invalidations().is_empty());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn raw_notifications_flow_through_normalization() {
    let (cache, coordinator) = setup(InvalidationConfig::new());
    let updated = |action| CacheNotification {
        notify: NotifyType::Updated,
        key: OperationKey::from(["transactions"]),
        action: Some(action),
    };

    assert!(cache.emit_raw(OperationKind::Read, updated(CacheAction::Fetch)));
    assert!(coordinator.loading().is_loading());

    assert!(cache.emit_raw(OperationKind::Read, updated(CacheAction::Pause)));
    assert!(!coordinator.loading().is_loading());
    assert_eq!(
        coordinator.notifications().latest().unwrap().message,
        "No internet connection"
    );

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn non_error_notifications_expire_but_errors_stay() {
    let (cache, coordinator) = setup(InvalidationConfig::new());

    cache.emit(&OperationEvent::write(write_key(), OperationPhase::Start));
    cache.emit(&OperationEvent::write(write_key(), OperationPhase::Success));
    cache.emit(&OperationEvent::read(["accounts"], OperationPhase::Start));
    cache.emit(&OperationEvent::read(["accounts"], OperationPhase::RetryFailed));
    assert_eq!(coordinator.notifications().len(), 2);

    tokio::time::sleep(Duration::from_millis(5001)).await;
    let remaining = coordinator.notifications().snapshot();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].message, "Something went wrong");

    let id = remaining[0].id;
    assert!(coordinator.notifications().dismiss(id));
    assert!(coordinator.notifications().is_empty());

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn push_messages_invalidate_everything_and_malformed_ones_are_dropped() {
    let (cache, coordinator) = setup(InvalidationConfig::new());
    let (transport, mut broker) = memory_transport();
    assert!(
        coordinator
            .connect_push(
                "u-7",
                Arc::new(transport.clone()),
                Arc::new(StaticCredentials::bearer("secret")),
            )
            .await
    );

    let mut session = broker.accept().await.unwrap();
    let (connect, subscribe) = session.handshake().await.unwrap();
    assert_eq!(connect.get("Authorization"), Some("Bearer secret"));
    let destination = subscribe.get("destination").unwrap().to_string();
    assert_eq!(destination, "/topic/notifications/u-7");
    let subscription = subscribe.get("id").unwrap().to_string();

    let mut latest = coordinator.dispatcher().subscribe_latest();
    assert!(session.publish(&destination, &subscription, "definitely not json"));
    assert!(session.publish(
        &destination,
        &subscription,
        r#"{"transactionId":"t-9","userId":"u-7","type":"transfer","amount":25,"assetCode":"USD"}"#,
    ));
    latest.changed().await.unwrap();

    assert_eq!(cache.take_invalidations(), vec![InvalidationRequest::All]);
    assert_eq!(
        coordinator.dispatcher().latest().unwrap().operation_id,
        "t-9"
    );
    let notification = coordinator.notifications().latest().unwrap();
    assert_eq!(notification.severity, Severity::Info);
    assert_eq!(
        notification.message,
        "New transaction: TRANSFER - 25 USD (Transfer completed)"
    );
    assert_eq!(transport.attempts(), 1);

    assert!(coordinator.shutdown().await);
    assert!(!coordinator.shutdown().await);
}
