//! Key-based invalidation of cached reads after writes and pushes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tidewatch_core::OperationKey;

use crate::traits::ReadInvalidator;

/// Static map from write domain to the read-key prefixes it makes stale.
///
/// JSON form: `{"account": [["accounts"]], "transaction": [["transactions"], ["accounts"]]}`.
/// The map may be partial; unknown domains invalidate nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvalidationConfig(HashMap<String, Vec<OperationKey>>);

impl InvalidationConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `prefixes` under `domain`, replacing any previous list.
    #[must_use]
    pub fn with<I, K>(mut self, domain: impl Into<String>, prefixes: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<OperationKey>,
    {
        self.0
            .insert(domain.into(), prefixes.into_iter().map(Into::into).collect());
        self
    }

    /// Prefixes configured for `domain`; empty when the domain is unknown.
    #[must_use]
    pub fn prefixes_for(&self, domain: &str) -> &[OperationKey] {
        self.0.get(domain).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Forwards invalidation requests to the read registry.
pub struct InvalidationRouter {
    target: Arc<dyn ReadInvalidator>,
}

impl InvalidationRouter {
    #[must_use]
    pub fn new(target: Arc<dyn ReadInvalidator>) -> Self {
        Self { target }
    }

    /// Requests invalidation of every prefix configured for `domain`.
    /// Returns the number of requests issued.
    pub fn invalidate(&self, domain: &str, config: &InvalidationConfig) -> usize {
        let prefixes = config.prefixes_for(domain);
        for prefix in prefixes {
            self.target.invalidate(prefix);
        }
        tracing::debug!(domain, requested = prefixes.len(), "reads invalidated for write domain");
        prefixes.len()
    }

    /// Requests invalidation of every tracked read.
    pub fn invalidate_all(&self) {
        self.target.invalidate_all();
        tracing::debug!("all reads invalidated");
    }
}

impl fmt::Debug for InvalidationRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationRouter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingInvalidator {
        prefixes: Mutex<Vec<OperationKey>>,
        all: Mutex<usize>,
    }

    impl ReadInvalidator for RecordingInvalidator {
        fn invalidate(&self, prefix: &OperationKey) {
            self.prefixes.lock().push(prefix.clone());
        }
        fn invalidate_all(&self) {
            *self.all.lock() += 1;
        }
    }

    #[test]
    fn invalidates_exactly_configured_prefixes() {
        let target = Arc::new(RecordingInvalidator::default());
        let router = InvalidationRouter::new(target.clone());
        let config = InvalidationConfig::new()
            .with("account", [["accounts"]])
            .with("transaction", [vec!["transactions".to_string()], vec!["accounts".to_string()]]);

        assert_eq!(router.invalidate("account", &config), 1);
        assert_eq!(*target.prefixes.lock(), vec![OperationKey::from(["accounts"])]);

        target.prefixes.lock().clear();
        assert_eq!(router.invalidate("transaction", &config), 2);
        assert_eq!(
            *target.prefixes.lock(),
            vec![
                OperationKey::from(["transactions"]),
                OperationKey::from(["accounts"])
            ]
        );
    }

    #[test]
    fn unknown_domain_is_noop() {
        let target = Arc::new(RecordingInvalidator::default());
        let router = InvalidationRouter::new(target.clone());
        let config = InvalidationConfig::new().with("account", [["accounts"]]);

        assert_eq!(router.invalidate("asset", &config), 0);
        assert!(target.prefixes.lock().is_empty());
        assert_eq!(*target.all.lock(), 0);
    }

    #[test]
    fn invalidate_all_forwards_once() {
        let target = Arc::new(RecordingInvalidator::default());
        InvalidationRouter::new(target.clone()).invalidate_all();
        assert_eq!(*target.all.lock(), 1);
    }

    #[test]
    fn config_parses_from_json() {
        let config: InvalidationConfig =
            serde_json::from_str(r#"{"account": [["accounts"]], "asset": []}"#).unwrap();
        assert_eq!(config.prefixes_for("account"), [OperationKey::from(["accounts"])]);
        assert!(config.prefixes_for("asset").is_empty());
        assert!(config.prefixes_for("missing").is_empty());
    }
}
