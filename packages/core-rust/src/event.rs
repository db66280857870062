//! Normalized operation lifecycle events.
//!
//! Both operation registries (reads and writes) report state transitions in
//! their own vocabulary; `normalize` folds them into one tagged event so the
//! classifier can match exhaustively on `(kind, phase)`.

use serde::{Deserialize, Serialize};

use crate::key::OperationKey;

/// Which registry an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Cached read (query). Never consults notification registrations.
    Read,
    /// Write (mutation). Success triggers key-based invalidation.
    Write,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Error payload attached to the `error` phase.
///
/// `content` is the server-supplied message extracted by the HTTP layer;
/// `message` is the transport-level error text. Either may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    #[serde(default, alias = "status", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ErrorDescriptor {
    /// Status code that marks the caller as unauthenticated.
    pub const UNAUTHENTICATED: u16 = 401;

    #[must_use]
    pub fn with_status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            message: Some(message.into()),
            content: None,
        }
    }

    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        self.status_code == Some(Self::UNAUTHENTICATED)
    }

    /// Most specific text available: `content`, then `message`, then `fallback`.
    #[must_use]
    pub fn most_specific_message<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.content
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or(fallback)
    }
}

/// Lifecycle phase of a single operation instance.
///
/// `Success` and `Error` are terminal and mutually exclusive per instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationPhase {
    /// Fetch issued (read) or mutation pending (write).
    Start,
    Success,
    Error(ErrorDescriptor),
    /// An attempt failed and the registry will retry.
    RetryFailed,
    /// Execution paused, typically for lack of connectivity.
    Paused,
    /// Execution resumed after a pause.
    Resumed,
    /// Cached entry marked stale; a refetch is pending.
    Invalidated,
    /// Transition with no user-facing meaning for this kind.
    Unknown,
}

impl OperationPhase {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Success => "success",
            Self::Error(_) => "error",
            Self::RetryFailed => "retry-failed",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Invalidated => "invalidated",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error(_))
    }
}

/// A normalized lifecycle event from either registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationEvent {
    pub kind: OperationKind,
    pub key: OperationKey,
    pub phase: OperationPhase,
}

impl OperationEvent {
    pub fn new(kind: OperationKind, key: impl Into<OperationKey>, phase: OperationPhase) -> Self {
        Self {
            kind,
            key: key.into(),
            phase,
        }
    }

    pub fn read(key: impl Into<OperationKey>, phase: OperationPhase) -> Self {
        Self::new(OperationKind::Read, key, phase)
    }

    pub fn write(key: impl Into<OperationKey>, phase: OperationPhase) -> Self {
        Self::new(OperationKind::Write, key, phase)
    }
}

// ---------------------------------------------------------------------------
// Raw cache notifications
// ---------------------------------------------------------------------------

/// Type of a raw cache notification. Only `Updated` carries an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotifyType {
    Added,
    Removed,
    Updated,
    ObserverAdded,
    ObserverRemoved,
    ObserverResultsUpdated,
    ObserverOptionsUpdated,
    #[serde(other)]
    Other,
}

/// Raw state-transition action as reported by an operation cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CacheAction {
    /// Read fetch issued.
    Fetch,
    /// Write pending.
    Pending,
    Success,
    Error {
        #[serde(default)]
        error: ErrorDescriptor,
    },
    /// Attempt failed, retries remain.
    Failed,
    Pause,
    Continue,
    /// Read entry invalidated.
    Invalidate,
    /// Read state replaced wholesale.
    SetState,
    #[serde(other)]
    Other,
}

/// A raw notification from an operation cache, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNotification {
    #[serde(rename = "type")]
    pub notify: NotifyType,
    pub key: OperationKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<CacheAction>,
}

/// Folds a raw cache notification into an [`OperationEvent`].
///
/// Returns `None` for notifications that are not `updated` transitions.
/// Actions that do not apply to `kind` (e.g. `pending` on a read) normalize
/// to [`OperationPhase::Unknown`].
#[must_use]
pub fn normalize(kind: OperationKind, notification: CacheNotification) -> Option<OperationEvent> {
    if notification.notify != NotifyType::Updated {
        return None;
    }
    let Some(action) = notification.action else {
        tracing::trace!(key = %notification.key, "updated notification without action");
        return None;
    };

    let phase = match (kind, action) {
        (OperationKind::Read, CacheAction::Fetch)
        | (OperationKind::Write, CacheAction::Pending) => OperationPhase::Start,
        (_, CacheAction::Success) => OperationPhase::Success,
        (_, CacheAction::Error { error }) => OperationPhase::Error(error),
        (_, CacheAction::Failed) => OperationPhase::RetryFailed,
        (_, CacheAction::Pause) => OperationPhase::Paused,
        (_, CacheAction::Continue) => OperationPhase::Resumed,
        (OperationKind::Read, CacheAction::Invalidate) => OperationPhase::Invalidated,
        (OperationKind::Read, CacheAction::SetState)
        | (OperationKind::Write, CacheAction::Fetch | CacheAction::Invalidate | CacheAction::SetState)
        | (OperationKind::Read, CacheAction::Pending)
        | (_, CacheAction::Other) => OperationPhase::Unknown,
    };

    Some(OperationEvent {
        kind,
        key: notification.key,
        phase,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn updated(key: &[&str], action: CacheAction) -> CacheNotification {
        CacheNotification {
            notify: NotifyType::Updated,
            key: OperationKey::from(key),
            action: Some(action),
        }
    }

    #[test]
    fn most_specific_message_prefers_content() {
        let err = ErrorDescriptor {
            status_code: Some(500),
            message: Some("transport".to_string()),
            content: Some("db down".to_string()),
        };
        assert_eq!(err.most_specific_message("Error"), "db down");

        let err = ErrorDescriptor::with_status(500, "db down");
        assert_eq!(err.most_specific_message("Error"), "db down");

        assert_eq!(ErrorDescriptor::default().most_specific_message("Error"), "Error");
    }

    #[test]
    fn non_updated_notifications_are_dropped() {
        let n = CacheNotification {
            notify: NotifyType::Added,
            key: OperationKey::from(["accounts"]),
            action: None,
        };
        assert!(normalize(OperationKind::Read, n).is_none());
    }

    #[test]
    fn start_action_depends_on_kind() {
        let read = normalize(OperationKind::Read, updated(&["accounts"], CacheAction::Fetch)).unwrap();
        assert_eq!(read.phase, OperationPhase::Start);

        let write =
            normalize(OperationKind::Write, updated(&["account", "post"], CacheAction::Pending))
                .unwrap();
        assert_eq!(write.phase, OperationPhase::Start);

        let misplaced =
            normalize(OperationKind::Read, updated(&["accounts"], CacheAction::Pending)).unwrap();
        assert_eq!(misplaced.phase, OperationPhase::Unknown);
    }

    #[test]
    fn invalidate_applies_to_reads_only() {
        let read =
            normalize(OperationKind::Read, updated(&["accounts"], CacheAction::Invalidate)).unwrap();
        assert_eq!(read.phase, OperationPhase::Invalidated);

        let write =
            normalize(OperationKind::Write, updated(&["account"], CacheAction::Invalidate)).unwrap();
        assert_eq!(write.phase, OperationPhase::Unknown);
    }

    #[test]
    fn error_action_deserializes_with_status_alias() {
        let json = r#"{"type":"updated","key":["accounts"],"action":{"type":"error","error":{"status":401,"content":"nope"}}}"#;
        let n: CacheNotification = serde_json::from_str(json).unwrap();
        let event = normalize(OperationKind::Read, n).unwrap();
        match event.phase {
            OperationPhase::Error(err) => {
                assert!(err.is_unauthenticated());
                assert_eq!(err.content.as_deref(), Some("nope"));
            }
            other => panic!("expected error phase, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_action_is_unknown() {
        let json = r#"{"type":"updated","key":["accounts"],"action":{"type":"somethingNew"}}"#;
        let n: CacheNotification = serde_json::from_str(json).unwrap();
        let event = normalize(OperationKind::Read, n).unwrap();
        assert_eq!(event.phase, OperationPhase::Unknown);
    }

    #[test]
    fn terminal_phases() {
        assert!(OperationPhase::Success.is_terminal());
        assert!(OperationPhase::Error(ErrorDescriptor::default()).is_terminal());
        assert!(!OperationPhase::RetryFailed.is_terminal());
        assert!(!OperationPhase::Start.is_terminal());
    }
}
