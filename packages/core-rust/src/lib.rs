//! Tidewatch core: operation keys, lifecycle events, the lifecycle classifier,
//! notification/registration types, push payloads and the STOMP frame codec.

pub mod classify;
pub mod event;
pub mod key;
pub mod notification;
pub mod push;
pub mod registration;
pub mod stomp;

pub use classify::{classify, Effect, LifecycleFault};
pub use event::{
    normalize, CacheAction, CacheNotification, ErrorDescriptor, NotifyType, OperationEvent,
    OperationKind, OperationPhase,
};
pub use key::OperationKey;
pub use notification::{NotificationRequest, Severity};
pub use push::PushMessage;
pub use registration::{Registration, RegistrationFlags};
