use std::sync::Arc;

use async_trait::async_trait;
use tidewatch_core::{OperationEvent, OperationKey, OperationKind};

use crate::subscription::Subscription;

/// Callback invoked synchronously for every event a registry emits.
pub type EventListener = Arc<dyn Fn(&OperationEvent) + Send + Sync>;

/// Live in-flight counts owned by the operation cache.
///
/// Read on every loading recomputation, so implementations must be cheap.
pub trait InFlightCounts: Send + Sync {
    /// Number of read operations currently fetching.
    fn in_flight_reads(&self) -> usize;

    /// Number of write operations currently pending.
    fn in_flight_writes(&self) -> usize;
}

/// Change-notification stream of one operation registry (reads or writes).
pub trait OperationRegistry: Send + Sync {
    /// Which kind of operation this registry tracks.
    fn kind(&self) -> OperationKind;

    /// Registers `listener` for every future event. Dropping or cancelling
    /// the returned handle stops delivery.
    fn subscribe(&self, listener: EventListener) -> Subscription;
}

/// Mark-stale-and-refetch primitives of the read registry.
pub trait ReadInvalidator: Send + Sync {
    /// Invalidate every read whose key starts with `prefix`.
    fn invalidate(&self, prefix: &OperationKey);

    /// Invalidate every tracked read.
    fn invalidate_all(&self);
}

/// Source of the bearer credential presented on each push (re)connect.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current `Authorization` header value, or `None` to connect anonymously.
    async fn authorization(&self) -> anyhow::Result<Option<String>>;
}
