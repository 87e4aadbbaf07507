use std::fmt;

use serde::{Deserialize, Serialize};

/// A security principal on whose behalf remote storage mutations run.
///
/// The aggregation engine never checks permissions itself; it only records
/// which principal an operation executes as. A deployment binds a
/// [`crate::ScopedStore`] to a store client that is actually authenticated
/// for this principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal(String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Principal(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(name: &str) -> Self {
        Principal(name.to_string())
    }
}
