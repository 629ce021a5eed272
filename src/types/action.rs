//! Actions: the top-level category instances are filed under.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An action, known by name, by remote id, or both
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Action {
    pub id: Option<u64>,
    pub name: Option<String>,
}

impl Action {
    /// Action to be created (or resolved) remotely by name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    /// Action that already exists remotely
    pub fn with_id(id: u64) -> Self {
        Self {
            id: Some(id),
            name: None,
        }
    }

    /// Human-readable identity used in logs and error messages
    pub fn display_name(&self) -> String {
        match (&self.name, self.id) {
            (Some(name), _) => name.clone(),
            (None, Some(id)) => format!("#{}", id),
            (None, None) => "<unnamed>".to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ACTION({}): {}",
            self.id.unwrap_or(0),
            self.name.as_deref().unwrap_or_default()
        )
    }
}
