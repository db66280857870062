//! Notification suppression flags registered by write call sites.

use serde::{Deserialize, Serialize};

/// Effective suppression state for one serialized write key.
///
/// A call site that supplies its own success or error message registers the
/// corresponding flag so the default notification is not shown twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub suppress_success: bool,
    pub suppress_error: bool,
}

/// Flags a call site supplies on register/unregister.
///
/// `None` leaves the stored flag untouched (shallow merge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationFlags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppress_success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppress_error: Option<bool>,
}

impl RegistrationFlags {
    /// No flags: registering creates an entry without suppressing anything.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            suppress_success: None,
            suppress_error: None,
        }
    }

    /// Flags derived from which custom messages a call site supplies.
    #[must_use]
    pub const fn custom_messages(has_success: bool, has_error: bool) -> Self {
        Self {
            suppress_success: Some(has_success),
            suppress_error: Some(has_error),
        }
    }

    #[must_use]
    pub const fn success(mut self, suppress: bool) -> Self {
        self.suppress_success = Some(suppress);
        self
    }

    #[must_use]
    pub const fn error(mut self, suppress: bool) -> Self {
        self.suppress_error = Some(suppress);
        self
    }

    /// Shallow-merges these flags over `registration`.
    pub fn merge_into(&self, registration: &mut Registration) {
        if let Some(s) = self.suppress_success {
            registration.suppress_success = s;
        }
        if let Some(e) = self.suppress_error {
            registration.suppress_error = e;
        }
    }
}
