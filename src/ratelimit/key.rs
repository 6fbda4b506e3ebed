//! Backend key construction.

use std::fmt;

/// The identity under which a counter store tracks one caller in one window.
///
/// Rendered as `[prefix_]bucket_caller`. The prefix segment is omitted when
/// the prefix is empty. Caller keys are used verbatim, so two callers only
/// share a counter when their keys are equal strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendKey(String);

impl BackendKey {
    /// Build the key for `caller` inside `bucket`.
    pub fn new(prefix: &str, bucket: &str, caller: &str) -> Self {
        let key = if prefix.is_empty() {
            format!("{}_{}", bucket, caller)
        } else {
            format!("{}_{}_{}", prefix, bucket, caller)
        };
        Self(key)
    }

    /// Borrow the rendered key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BackendKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
