//! Global busy indicator derived from in-flight counts and an explicit override.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::traits::InFlightCounts;

/// Derives the process-wide loading flag.
///
/// Every `set_loading` call recomputes
/// `in_flight_reads > 0 || in_flight_writes > 0 || override` and republishes
/// it synchronously. There is no debouncing; consumers must tolerate
/// repeated identical values.
pub struct LoadingAggregator {
    counts: Arc<dyn InFlightCounts>,
    state: watch::Sender<bool>,
    last_override: AtomicBool,
}

impl LoadingAggregator {
    #[must_use]
    pub fn new(counts: Arc<dyn InFlightCounts>) -> Self {
        let (state, _rx) = watch::channel(false);
        Self {
            counts,
            state,
            last_override: AtomicBool::new(false),
        }
    }

    /// Latches `override_value`, recomputes and publishes. Returns the new state.
    pub fn set_loading(&self, override_value: bool) -> bool {
        self.last_override.store(override_value, Ordering::Relaxed);
        let reads = self.counts.in_flight_reads();
        let writes = self.counts.in_flight_writes();
        let loading = reads > 0 || writes > 0 || override_value;
        self.state.send_replace(loading);
        tracing::trace!(reads, writes, override_value, loading, "loading recomputed");
        loading
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        *self.state.borrow()
    }

    /// The override latched by the most recent `set_loading` call.
    #[must_use]
    pub fn last_override(&self) -> bool {
        self.last_override.load(Ordering::Relaxed)
    }

    /// Receiver notified on every republish, including unchanged values.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl fmt::Debug for LoadingAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingAggregator")
            .field("loading", &self.is_loading())
            .field("last_override", &self.last_override())
            .finish_non_exhaustive()
    }
}
