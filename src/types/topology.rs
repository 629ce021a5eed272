//! Topologies: ordered sequences of component roles defining an instance shape.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural role of a value position within a topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    None,
    Who,
    What,
    Where,
    When,
}

impl ComponentType {
    /// Numeric role identifier as used on the wire and in shape keys
    pub fn id(&self) -> u32 {
        match self {
            ComponentType::None => 0,
            ComponentType::Who => 1,
            ComponentType::What => 2,
            ComponentType::Where => 3,
            ComponentType::When => 4,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentType::None => "CT_NONE",
            ComponentType::Who => "WHO",
            ComponentType::What => "WHAT",
            ComponentType::Where => "WHERE",
            ComponentType::When => "WHEN",
        };
        write!(f, "{}", name)
    }
}

/// Comma-joined decimal role ids, e.g. `1,2,2`
pub fn shape_key(components: &[ComponentType]) -> String {
    components
        .iter()
        .map(|c| c.id().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// A topology, known by remote id and/or by its component sequence
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Topology {
    pub id: Option<u64>,
    pub sequence: Vec<ComponentType>,
}

impl Topology {
    pub fn from_components(components: &[ComponentType]) -> Self {
        Self {
            id: None,
            sequence: components.to_vec(),
        }
    }

    pub fn shape_key(&self) -> String {
        shape_key(&self.sequence)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TOPOLOGY({}): {}", self.id.unwrap_or(0), self.shape_key())
    }
}
