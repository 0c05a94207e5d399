//! Content identity type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a file version, derived from its complete byte content.
///
/// Two copies with equal identities are treated as the same version; this is
/// the only signal used to decide whether a transfer is needed. An empty
/// identity means "not computed yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wraps an already computed identity string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The placeholder identity of a record that still needs hashing.
    #[must_use]
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Whether the identity is still to be computed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
