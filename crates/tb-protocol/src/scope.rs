//! Scope identifier type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of subscription filtering (a project on the board)
///
/// `ScopeId::ALL` (zero) addresses every scope, both when subscribing and
/// when announcing a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub i64);

impl ScopeId {
    /// Wildcard scope
    pub const ALL: ScopeId = ScopeId(0);

    /// Create a new scope ID
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Whether this is the wildcard scope
    pub fn is_all(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            write!(f, "scope-*")
        } else {
            write!(f, "scope-{}", self.0)
        }
    }
}

impl From<i64> for ScopeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}
