//! Labels annotating the positions of a topology within an action.

use crate::types::{Action, Topology};
use serde::{Deserialize, Serialize};

/// Free-text annotation of one (1-based) topology position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub position: u32,
    pub value: String,
}

impl Label {
    pub fn new(position: u32, value: impl Into<String>) -> Self {
        Self {
            position,
            value: value.into(),
        }
    }
}

/// The label set of one action/topology pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Labels {
    pub action: Action,
    pub topology: Topology,
    labels: Vec<Label>,
}

impl Labels {
    pub fn new(action: Action, topology: Topology) -> Self {
        Self {
            action,
            topology,
            labels: Vec::new(),
        }
    }

    /// Build a label set with one label per position, in declaration order.
    pub fn from_positions<S: AsRef<str>>(action: Action, topology: Topology, values: &[S]) -> Self {
        let mut labels = Self::new(action, topology);
        for (idx, value) in values.iter().enumerate() {
            labels.add_label(Label::new(idx as u32 + 1, value.as_ref()));
        }
        labels
    }

    /// Add a label; a label already present at the same position is renamed.
    pub fn add_label(&mut self, label: Label) {
        match self.labels.iter_mut().find(|l| l.position == label.position) {
            Some(existing) => existing.value = label.value,
            None => self.labels.push(label),
        }
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }
}
