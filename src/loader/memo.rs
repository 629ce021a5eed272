//! Per-run topology memo.
//!
//! Keyed by the comma-joined role ids of a shape. A shape's topology and its
//! label set are created remotely the first time the shape is seen in a
//! mapping run and reused for every later record with the same shape.

use crate::loader::error::LoaderError;
use crate::loader::summary::MappingSummary;
use crate::service::{Operation, Service};
use crate::types::{shape_key, Action, ComponentType, Labels, Topology};
use indexmap::IndexMap;

#[derive(Debug, Default)]
pub struct TopologyMemo {
    topologies: IndexMap<String, Topology>,
}

impl TopologyMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Topology> {
        self.topologies.get(key)
    }

    pub fn len(&self) -> usize {
        self.topologies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topologies.is_empty()
    }

    /// Shape keys in first-seen order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.topologies.keys().map(String::as_str)
    }

    /// Topology for the shape, creating it and its labels on first sight
    ///
    /// Topology creation failures are fatal; label failures only count
    /// towards `summary.label_failures`.
    pub fn resolve(
        &mut self,
        service: &mut dyn Service,
        action: &Action,
        components: &[ComponentType],
        labels: &[String],
        summary: &mut MappingSummary,
    ) -> Result<Topology, LoaderError> {
        let key = shape_key(components);
        if let Some(topology) = self.topologies.get(&key) {
            return Ok(topology.clone());
        }

        let action_name = action.display_name();
        let topology = service
            .create_topology(&Topology::from_components(components))
            .map_err(|e| LoaderError::service(&action_name, Operation::CreateTopology, e))?;
        summary.topologies_created += 1;
        tracing::debug!("Created {} for {}", topology, action_name);

        let label_set = Labels::from_positions(action.clone(), topology.clone(), labels);
        match service.create_labels(&label_set) {
            Ok(true) => {}
            Ok(false) => {
                summary.label_failures += 1;
                tracing::warn!("Failed to create labels for {} ({})", action_name, key);
            }
            Err(e) => {
                summary.label_failures += 1;
                tracing::warn!("Failed to create labels for {} ({}): {}", action_name, key, e);
            }
        }

        self.topologies.insert(key, topology.clone());
        Ok(topology)
    }
}
