//! Lifecycle classification: converts an `OperationEvent` into an `Effect`.
//!
//! Classification is pure. Applying the effect (publishing the loading flag,
//! enqueueing the notification, logging the fault) is the caller's job.

use crate::event::{ErrorDescriptor, OperationEvent, OperationKind, OperationPhase};
use crate::key::OperationKey;
use crate::notification::NotificationRequest;
use crate::registration::Registration;

pub const SUCCESS_MESSAGE: &str = "Action Successful";
pub const UNAUTHENTICATED_MESSAGE: &str = "You are not authenticated";
pub const RETRY_FAILED_MESSAGE: &str = "Something went wrong";
pub const OFFLINE_MESSAGE: &str = "No internet connection";
pub const FALLBACK_ERROR_MESSAGE: &str = "Error";

// ---------------------------------------------------------------------------
// LifecycleFault
// ---------------------------------------------------------------------------

/// Fault surfaced by a lifecycle event. None of these are fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleFault {
    /// Status 401 on a read or write.
    Authentication { key: OperationKey },
    /// Any other error phase.
    Operation {
        key: OperationKey,
        error: ErrorDescriptor,
    },
    /// Execution paused for lack of connectivity. Clears on `resumed`.
    Connectivity { key: OperationKey },
}

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

/// What an event asks the coordinator to do.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Effect {
    /// Explicit loading override to publish, if any.
    pub set_loading: Option<bool>,
    /// Notification to enqueue, if any.
    pub notification: Option<NotificationRequest>,
    /// Fault to log, if any.
    pub fault: Option<LifecycleFault>,
}

impl Effect {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn loading(value: bool) -> Self {
        Self {
            set_loading: Some(value),
            ..Self::default()
        }
    }

    #[must_use]
    fn notify(mut self, request: Option<NotificationRequest>) -> Self {
        self.notification = request;
        self
    }

    #[must_use]
    fn fault(mut self, fault: LifecycleFault) -> Self {
        self.fault = Some(fault);
        self
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        self.set_loading.is_none() && self.notification.is_none() && self.fault.is_none()
    }
}

// ---------------------------------------------------------------------------
// classify
// ---------------------------------------------------------------------------

/// Classifies a lifecycle event.
///
/// `registration` is the entry for the event's serialized key, if the caller
/// found one. It only affects the default `success` and non-401 `error`
/// notifications of write events; read events ignore it.
#[must_use]
pub fn classify(event: &OperationEvent, registration: Option<&Registration>) -> Effect {
    let registration = match event.kind {
        OperationKind::Write => registration.copied().unwrap_or_default(),
        OperationKind::Read => Registration::default(),
    };

    match &event.phase {
        OperationPhase::Start | OperationPhase::Resumed | OperationPhase::Invalidated => {
            Effect::loading(true)
        }
        OperationPhase::Success => {
            let notification = (event.kind == OperationKind::Write
                && !registration.suppress_success)
                .then(|| NotificationRequest::success(SUCCESS_MESSAGE));
            Effect::loading(false).notify(notification)
        }
        OperationPhase::Error(error) if error.is_unauthenticated() => Effect::loading(false)
            .notify(Some(NotificationRequest::error(UNAUTHENTICATED_MESSAGE)))
            .fault(LifecycleFault::Authentication {
                key: event.key.clone(),
            }),
        OperationPhase::Error(error) => {
            let notification = (!registration.suppress_error).then(|| {
                NotificationRequest::error(error.most_specific_message(FALLBACK_ERROR_MESSAGE))
            });
            Effect::loading(false)
                .notify(notification)
                .fault(LifecycleFault::Operation {
                    key: event.key.clone(),
                    error: error.clone(),
                })
        }
        OperationPhase::RetryFailed => {
            Effect::loading(false).notify(Some(NotificationRequest::error(RETRY_FAILED_MESSAGE)))
        }
        OperationPhase::Paused => Effect::loading(false)
            .notify(Some(NotificationRequest::error(OFFLINE_MESSAGE)))
            .fault(LifecycleFault::Connectivity {
                key: event.key.clone(),
            }),
        OperationPhase::Unknown => Effect::none(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
