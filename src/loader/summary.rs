//! Run summaries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Counters for one mapping run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingSummary {
    pub action: String,
    pub action_id: Option<u64>,
    /// Records the walker visited, over all passes
    pub records: usize,
    pub accepted_primary: usize,
    pub accepted_fallback: usize,
    pub skipped: usize,
    pub topologies_created: usize,
    pub label_failures: usize,
    pub batches_pushed: usize,
    pub instances_pushed: usize,
    /// Loop-variable combinations (tree sources)
    pub combinations: usize,
    /// Walk passes over a resolved root
    pub passes: usize,
}

impl MappingSummary {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted_primary + self.accepted_fallback
    }
}

/// Outcome of one loader run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub mappings: Vec<MappingSummary>,
}

impl LoadSummary {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            mappings: Vec::new(),
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn records(&self) -> usize {
        self.mappings.iter().map(|m| m.records).sum()
    }

    pub fn accepted(&self) -> usize {
        self.mappings.iter().map(MappingSummary::accepted).sum()
    }

    pub fn skipped(&self) -> usize {
        self.mappings.iter().map(|m| m.skipped).sum()
    }

    pub fn instances_pushed(&self) -> usize {
        self.mappings.iter().map(|m| m.instances_pushed).sum()
    }

    pub fn batches_pushed(&self) -> usize {
        self.mappings.iter().map(|m| m.batches_pushed).sum()
    }
}
