//! Operation keys: the identity of a read or write operation in the cache.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered sequence of string segments identifying an operation.
///
/// The first segment is the operation's *domain* (e.g. `"account"` in
/// `["account", "post"]`). Write keys are used verbatim as the identity of a
/// write operation instance; read keys double as invalidation prefixes.
///
/// Serializes as a plain JSON array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKey(Vec<String>);

impl OperationKey {
    /// Creates a key from any iterable of string-like segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Returns the domain (first segment), or `None` for an empty key.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `prefix` is an element-wise prefix of this key.
    ///
    /// The empty key is a prefix of every key.
    #[must_use]
    pub fn starts_with(&self, prefix: &OperationKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Compact JSON text of the key, e.g. `["account","post"]`.
    ///
    /// This is the lookup key for notification registrations, so call sites
    /// and the write observer must agree on it byte-for-byte.
    #[must_use]
    pub fn serialized(&self) -> String {
        // Serializing a Vec<String> to JSON cannot fail.
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized())
    }
}

impl<S: Into<String>> FromIterator<S> for OperationKey {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl From<Vec<String>> for OperationKey {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&[&str]> for OperationKey {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for OperationKey {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_is_first_segment() {
        let key = OperationKey::from(["account", "post", "debit"]);
        assert_eq!(key.domain(), Some("account"));
        assert_eq!(OperationKey::default().domain(), None);
    }

    #[test]
    fn serialized_form_is_compact_json() {
        let key = OperationKey::from(["account", "post"]);
        assert_eq!(key.serialized(), r#"["account","post"]"#);
        assert_eq!(key.to_string(), key.serialized());
    }

    #[test]
    fn serialized_form_escapes_segments() {
        let key = OperationKey::from(["a\"b"]);
        assert_eq!(key.serialized(), r#"["a\"b"]"#);
    }

    #[test]
    fn prefix_matching_is_element_wise() {
        let key = OperationKey::from(["accounts", "42"]);
        assert!(key.starts_with(&OperationKey::from(["accounts"])));
        assert!(key.starts_with(&OperationKey::default()));
        assert!(!key.starts_with(&OperationKey::from(["account"])));
        assert!(!key.starts_with(&OperationKey::from(["accounts", "42", "x"])));
    }

    #[test]
    fn deserializes_from_json_array() {
        let key: OperationKey = serde_json::from_str(r#"["transactions"]"#).unwrap();
        assert_eq!(key, OperationKey::from(["transactions"]));
    }
}
