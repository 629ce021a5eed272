//! In-process graph store.

use crate::service::{Operation, Service, ServiceError};
use crate::types::{Action, Instance, InstanceBatches, Labels, Topology};
use indexmap::IndexMap;
use serde::Serialize;

/// Count of calls per operation, plus the size of every batch call
///
/// `batch_sizes` stays empty for a store built with
/// [`MemoryService::ids_only`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallLog {
    pub create_action: usize,
    pub create_topology: usize,
    pub create_labels: usize,
    pub batch_create: usize,
    pub instances_received: usize,
    pub batch_sizes: Vec<usize>,
}

/// A store that keeps everything in memory
///
/// Actions are idempotent by name and topologies are deduplicated by their
/// component sequence, mirroring the remote store. Ids start at 1.
#[derive(Debug, Default)]
pub struct MemoryService {
    actions: Vec<Action>,
    topologies: IndexMap<String, Topology>,
    labels: IndexMap<(u64, u64), Labels>,
    instances: Vec<Instance>,
    calls: CallLog,
    next_id: u64,
    discard_instances: bool,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that assigns ids and keeps actions, topologies and labels, but
    /// drops every instance once its batch has been accepted
    pub fn ids_only() -> Self {
        Self {
            discard_instances: true,
            ..Self::default()
        }
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn topologies(&self) -> impl Iterator<Item = &Topology> {
        self.topologies.values()
    }

    pub fn topology_count(&self) -> usize {
        self.topologies.len()
    }

    /// Labels stored for an action/topology pair
    pub fn labels_for(&self, action_id: u64, topology_id: u64) -> Option<&Labels> {
        self.labels.get(&(action_id, topology_id))
    }

    pub fn label_sets(&self) -> usize {
        self.labels.len()
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }
}

impl Service for MemoryService {
    fn create_action(&mut self, action: &Action) -> Result<Action, ServiceError> {
        self.calls.create_action += 1;

        let existing = self.actions.iter().find(|known| match (action.id, &action.name) {
            (Some(id), _) => known.id == Some(id),
            (None, Some(name)) => known.name.as_ref() == Some(name),
            (None, None) => false,
        });
        if let Some(existing) = existing {
            return Ok(existing.clone());
        }

        let created = match (action.id, &action.name) {
            (None, None) => {
                return Err(ServiceError::InvalidRequest {
                    operation: Operation::CreateAction,
                    message: "action has neither id nor name".to_string(),
                })
            }
            (Some(id), _) => {
                self.next_id = self.next_id.max(id);
                action.clone()
            }
            (None, Some(name)) => Action {
                id: Some(self.allocate_id()),
                name: Some(name.clone()),
            },
        };
        self.actions.push(created.clone());
        Ok(created)
    }

    fn create_topology(&mut self, topology: &Topology) -> Result<Topology, ServiceError> {
        self.calls.create_topology += 1;

        if topology.sequence.len() < 2 {
            return Err(ServiceError::InvalidRequest {
                operation: Operation::CreateTopology,
                message: format!(
                    "topology needs at least two components, got {}",
                    topology.sequence.len()
                ),
            });
        }

        let key = topology.shape_key();
        if let Some(existing) = self.topologies.get(&key) {
            return Ok(existing.clone());
        }

        let created = Topology {
            id: Some(self.allocate_id()),
            sequence: topology.sequence.clone(),
        };
        self.topologies.insert(key, created.clone());
        Ok(created)
    }

    fn create_labels(&mut self, labels: &Labels) -> Result<bool, ServiceError> {
        self.calls.create_labels += 1;

        let (Some(action_id), Some(topology_id)) = (labels.action.id, labels.topology.id) else {
            return Err(ServiceError::InvalidRequest {
                operation: Operation::CreateLabels,
                message: "labels need a created action and topology".to_string(),
            });
        };

        self.labels.insert((action_id, topology_id), labels.clone());
        Ok(true)
    }

    fn batch_create_instances(&mut self, batches: &InstanceBatches) -> Result<bool, ServiceError> {
        self.calls.batch_create += 1;
        if !self.discard_instances {
            self.calls.batch_sizes.push(batches.len());
        }

        // Reject the whole batch before storing any of it.
        batches.batches()?;
        self.calls.instances_received += batches.len();
        if !self.discard_instances {
            self.instances.extend(batches.instances().iter().cloned());
        }
        Ok(true)
    }
}
