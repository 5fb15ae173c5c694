//! Logical browser identities exposed to reporters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The identity a reporter sees in place of any physical executor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrowserAlias {
    /// Logical browser name (e.g. "Chrome").
    pub name: String,

    /// Externally configured id; `None` when the name has no alias entry.
    #[serde(default)]
    pub id: Option<String>,
}

impl fmt::Display for BrowserAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} ({})", self.name, id),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Look up the alias for a logical browser name.
///
/// A name absent from `table` resolves with `id: None`; that is not an error.
pub fn resolve_alias(table: &BTreeMap<String, String>, logical_name: &str) -> BrowserAlias {
    BrowserAlias {
        name: logical_name.to_string(),
        id: table.get(logical_name).cloned(),
    }
}
