//! Registry of per-key notification suppression.
//!
//! Write call sites that show their own success/error message register the
//! matching flag under the write's serialized key. The observer looks the key
//! up before enqueueing a default notification.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tidewatch_core::{OperationKey, Registration, RegistrationFlags};

/// What `unregister` does to previously registered flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseMode {
    /// Each `Some(true)` flag is a hold; unregister withdraws only the holds
    /// the caller contributed. A flag stays set while any holder remains.
    #[default]
    Contributed,
    /// Register and unregister perform the same shallow merge, so flags
    /// survive the call site that set them.
    Merge,
}

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    success_holds: u32,
    error_holds: u32,
}

impl Entry {
    fn view(self) -> Registration {
        Registration {
            suppress_success: self.success_holds > 0,
            suppress_error: self.error_holds > 0,
        }
    }

    fn register(&mut self, flags: RegistrationFlags, mode: ReleaseMode) {
        match mode {
            ReleaseMode::Contributed => {
                if flags.suppress_success == Some(true) {
                    self.success_holds += 1;
                }
                if flags.suppress_error == Some(true) {
                    self.error_holds += 1;
                }
            }
            ReleaseMode::Merge => self.merge(flags),
        }
    }

    fn release(&mut self, flags: RegistrationFlags, mode: ReleaseMode) {
        match mode {
            ReleaseMode::Contributed => {
                if flags.suppress_success == Some(true) {
                    self.success_holds = self.success_holds.saturating_sub(1);
                }
                if flags.suppress_error == Some(true) {
                    self.error_holds = self.error_holds.saturating_sub(1);
                }
            }
            ReleaseMode::Merge => self.merge(flags),
        }
    }

    fn merge(&mut self, flags: RegistrationFlags) {
        let mut view = self.view();
        flags.merge_into(&mut view);
        self.success_holds = u32::from(view.suppress_success);
        self.error_holds = u32::from(view.suppress_error);
    }
}

/// Process-wide map from serialized write key to suppression flags.
///
/// Entries are created on first `register` and persist until `remove`.
pub struct RegistrationRegistry {
    entries: DashMap<String, Entry>,
    mode: ReleaseMode,
}

impl RegistrationRegistry {
    #[must_use]
    pub fn new(mode: ReleaseMode) -> Self {
        Self {
            entries: DashMap::new(),
            mode,
        }
    }

    #[must_use]
    pub fn mode(&self) -> ReleaseMode {
        self.mode
    }

    /// Called when a call site mounts. Creates the entry if absent.
    pub fn register(&self, key: &OperationKey, flags: RegistrationFlags) {
        let serialized = key.serialized();
        let view = {
            let mut entry = self.entries.entry(serialized.clone()).or_default();
            entry.register(flags, self.mode);
            entry.view()
        };
        tracing::debug!(key = %serialized, ?flags, ?view, "notification registration added");
    }

    /// Called when a call site unmounts, with the flags it registered.
    ///
    /// Under [`ReleaseMode::Contributed`] an unknown key has no holds to
    /// withdraw and is left absent. [`ReleaseMode::Merge`] creates the entry.
    pub fn unregister(&self, key: &OperationKey, flags: RegistrationFlags) {
        let serialized = key.serialized();
        let view = match self.mode {
            ReleaseMode::Contributed => match self.entries.get_mut(&serialized) {
                Some(mut entry) => {
                    entry.release(flags, self.mode);
                    entry.view()
                }
                None => {
                    tracing::debug!(key = %serialized, "release for unregistered key ignored");
                    return;
                }
            },
            ReleaseMode::Merge => {
                let mut entry = self.entries.entry(serialized.clone()).or_default();
                entry.release(flags, self.mode);
                entry.view()
            }
        };
        tracing::debug!(key = %serialized, ?flags, ?view, "notification registration released");
    }

    /// Registers and returns a guard that unregisters the same flags exactly
    /// once, when released or dropped.
    #[must_use]
    pub fn acquire(self: &Arc<Self>, key: OperationKey, flags: RegistrationFlags) -> RegistrationGuard {
        self.register(&key, flags);
        RegistrationGuard {
            registry: Arc::clone(self),
            key,
            flags,
            released: AtomicBool::new(false),
        }
    }

    /// Suppression flags for `key`; `None` means no suppression.
    #[must_use]
    pub fn lookup(&self, key: &OperationKey) -> Option<Registration> {
        self.lookup_serialized(&key.serialized())
    }

    #[must_use]
    pub fn lookup_serialized(&self, serialized: &str) -> Option<Registration> {
        self.entries.get(serialized).map(|entry| entry.view())
    }

    /// Drops the entry for `key` entirely.
    pub fn remove(&self, key: &OperationKey) -> Option<Registration> {
        self.entries
            .remove(&key.serialized())
            .map(|(_, entry)| entry.view())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RegistrationRegistry {
    fn default() -> Self {
        Self::new(ReleaseMode::default())
    }
}

impl fmt::Debug for RegistrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRegistry")
            .field("mode", &self.mode)
            .field("entries", &self.entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RegistrationGuard
// ---------------------------------------------------------------------------

/// Scoped registration. Releases on every exit path of the owning scope.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<RegistrationRegistry>,
    key: OperationKey,
    flags: RegistrationFlags,
    released: AtomicBool,
}

impl RegistrationGuard {
    #[must_use]
    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    /// Unregisters now. Returns `false` if already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.registry.unregister(&self.key, self.flags);
        true
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> OperationKey {
        OperationKey::from(["account", "post"])
    }

    fn success_only() -> RegistrationFlags {
        RegistrationFlags::none().success(true)
    }

    #[test]
    fn absent_entry_means_no_suppression() {
        let registry = RegistrationRegistry::default();
        assert!(registry.lookup(&key()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn register_without_flags_creates_empty_entry() {
        let registry = RegistrationRegistry::default();
        registry.register(&key(), RegistrationFlags::none());
        assert_eq!(registry.lookup(&key()), Some(Registration::default()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_by_serialized_key() {
        let registry = RegistrationRegistry::default();
        registry.register(&key(), success_only());
        let reg = registry.lookup_serialized(r#"["account","post"]"#).unwrap();
        assert!(reg.suppress_success);
        assert!(!reg.suppress_error);
    }

    #[test]
    fn contributed_release_clears_own_flags_but_keeps_entry() {
        let registry = RegistrationRegistry::new(ReleaseMode::Contributed);
        registry.register(&key(), success_only());
        registry.unregister(&key(), success_only());
        assert_eq!(registry.lookup(&key()), Some(Registration::default()));
    }

    #[test]
    fn contributed_overlapping_holders_do_not_starve_each_other() {
        let registry = RegistrationRegistry::new(ReleaseMode::Contributed);
        registry.register(&key(), success_only());
        registry.register(&key(), RegistrationFlags::custom_messages(true, true));
        // A third site without custom messages does not clear anything.
        registry.register(&key(), RegistrationFlags::custom_messages(false, false));

        registry.unregister(&key(), RegistrationFlags::custom_messages(true, true));
        let reg = registry.lookup(&key()).unwrap();
        assert!(reg.suppress_success);
        assert!(!reg.suppress_error);

        registry.unregister(&key(), success_only());
        assert!(!registry.lookup(&key()).unwrap().suppress_success);
    }

    #[test]
    fn contributed_release_of_unknown_key_creates_nothing() {
        let registry = RegistrationRegistry::new(ReleaseMode::Contributed);
        registry.unregister(&key(), success_only());
        registry.unregister(&OperationKey::from(["asset", "post"]), RegistrationFlags::none());
        assert!(registry.is_empty());
        assert!(registry.lookup(&key()).is_none());
    }

    #[test]
    fn contributed_release_never_underflows() {
        let registry = RegistrationRegistry::new(ReleaseMode::Contributed);
        registry.register(&key(), RegistrationFlags::none());
        registry.unregister(&key(), success_only());
        registry.register(&key(), success_only());
        assert!(registry.lookup(&key()).unwrap().suppress_success);
    }

    #[test]
    fn merge_mode_keeps_flags_after_unregister() {
        let registry = RegistrationRegistry::new(ReleaseMode::Merge);
        registry.register(&key(), success_only());
        registry.unregister(&key(), success_only());
        assert!(registry.lookup(&key()).unwrap().suppress_success);

        // Only an explicit false from another site clears it.
        registry.register(&key(), RegistrationFlags::custom_messages(false, false));
        assert_eq!(registry.lookup(&key()), Some(Registration::default()));
    }

    #[test]
    fn guard_releases_exactly_once() {
        let registry = Arc::new(RegistrationRegistry::new(ReleaseMode::Contributed));
        let first = registry.acquire(key(), success_only());
        let second = registry.acquire(key(), success_only());

        assert!(first.release());
        assert!(!first.release());
        drop(first);
        assert!(registry.lookup(&key()).unwrap().suppress_success);

        drop(second);
        assert!(!registry.lookup(&key()).unwrap().suppress_success);
    }

    #[test]
    fn guard_released_on_early_exit() {
        fn mount(registry: &Arc<RegistrationRegistry>) -> Result<(), &'static str> {
            let _guard = registry.acquire(key(), success_only());
            Err("mount failed")
        }

        let registry = Arc::new(RegistrationRegistry::default());
        assert!(mount(&registry).is_err());
        assert!(!registry.lookup(&key()).unwrap().suppress_success);
    }

    #[test]
    fn remove_drops_entry() {
        let registry = RegistrationRegistry::default();
        registry.register(&key(), success_only());
        assert!(registry.remove(&key()).unwrap().suppress_success);
        assert!(registry.lookup(&key()).is_none());
        assert!(registry.remove(&key()).is_none());
    }
}
