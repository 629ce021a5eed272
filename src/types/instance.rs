//! Instances and the batches they are pushed in.

use crate::types::{Action, ComponentType, Topology, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One concrete record: an action, a topology and one value per position
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub action: Action,
    pub topology: Topology,
    pub values: Vec<Value>,
}

impl Instance {
    pub fn new(action: Action, topology: Topology, values: Vec<Value>) -> Self {
        Self {
            action,
            topology,
            values,
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(
            f,
            "INSTANCE({} - {}): [{}]",
            self.action.name.as_deref().unwrap_or_default(),
            self.topology.shape_key(),
            values.join(",")
        )
    }
}

/// Why an instance cannot be placed in a batch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstanceError {
    #[error("No valid action set for instance")]
    MissingAction,
    #[error("No valid topology set for instance")]
    MissingTopology,
}

/// Reference to the action of a batch: remote id when known, else the name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRef {
    Id(u64),
    Name(String),
}

/// Reference to the topology of a batch: remote id when known, else the sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyRef {
    Id(u64),
    Sequence(Vec<ComponentType>),
}

/// Value lists sharing one action/topology pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceBatch {
    pub action: ActionRef,
    pub topology: TopologyRef,
    pub values: Vec<Vec<Value>>,
}

/// A list of instances submitted in one batch-create call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceBatches {
    instances: Vec<Instance>,
}

impl InstanceBatches {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self { instances }
    }

    pub fn add_instance(&mut self, instance: Instance) {
        self.instances.push(instance);
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn into_instances(self) -> Vec<Instance> {
        self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Group the instances by action/topology, preserving first-seen order
    /// of the groups and the order of values within each group.
    pub fn batches(&self) -> Result<Vec<InstanceBatch>, InstanceError> {
        let mut groups: IndexMap<String, InstanceBatch> = IndexMap::new();

        for inst in &self.instances {
            let action = match (&inst.action.id, &inst.action.name) {
                (Some(id), _) => ActionRef::Id(*id),
                (None, Some(name)) => ActionRef::Name(name.clone()),
                (None, None) => return Err(InstanceError::MissingAction),
            };
            let topology = match inst.topology.id {
                Some(id) => TopologyRef::Id(id),
                None if inst.topology.sequence.len() >= 2 => {
                    TopologyRef::Sequence(inst.topology.sequence.clone())
                }
                None => return Err(InstanceError::MissingTopology),
            };

            let act_key = match &action {
                ActionRef::Id(id) => id.to_string(),
                ActionRef::Name(name) => name.clone(),
            };
            let top_key = match &topology {
                TopologyRef::Id(id) => id.to_string(),
                TopologyRef::Sequence(_) => inst.topology.shape_key(),
            };

            groups
                .entry(format!("{}/{}", act_key, top_key))
                .or_insert_with(|| InstanceBatch {
                    action,
                    topology,
                    values: Vec::new(),
                })
                .values
                .push(inst.values.clone());
        }

        Ok(groups.into_values().collect())
    }
}

impl From<Vec<Instance>> for InstanceBatches {
    fn from(instances: Vec<Instance>) -> Self {
        Self::new(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(action_id: u64, topology_id: u64, value: &str) -> Instance {
        Instance::new(
            Action::with_id(action_id),
            Topology {
                id: Some(topology_id),
                sequence: vec![],
            },
            vec![Value::from(value)],
        )
    }

    #[test]
    fn test_batches_group_by_action_and_topology() {
        let batches = InstanceBatches::new(vec![
            instance(1, 10, "a"),
            instance(1, 11, "b"),
            instance(1, 10, "c"),
            instance(2, 10, "d"),
        ]);

        let groups = batches.batches().unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].action, ActionRef::Id(1));
        assert_eq!(groups[0].topology, TopologyRef::Id(10));
        assert_eq!(
            groups[0].values,
            vec![vec![Value::from("a")], vec![Value::from("c")]]
        );
        assert_eq!(groups[2].action, ActionRef::Id(2));
    }

    #[test]
    fn test_batches_fall_back_to_names_and_sequences() {
        let inst = Instance::new(
            Action::named("Person"),
            Topology::from_components(&[ComponentType::Who, ComponentType::What]),
            vec![Value::from("x"), Value::from("y")],
        );
        let groups = InstanceBatches::new(vec![inst]).batches().unwrap();
        assert_eq!(groups[0].action, ActionRef::Name("Person".to_string()));
        assert_eq!(
            groups[0].topology,
            TopologyRef::Sequence(vec![ComponentType::Who, ComponentType::What])
        );
    }

    #[test]
    fn test_batches_reject_unusable_instances() {
        let no_action = Instance::new(Action::default(), Topology::default(), vec![]);
        assert_eq!(
            InstanceBatches::new(vec![no_action]).batches(),
            Err(InstanceError::MissingAction)
        );

        let degenerate = Instance::new(
            Action::with_id(1),
            Topology::from_components(&[ComponentType::Who]),
            vec![],
        );
        assert_eq!(
            InstanceBatches::new(vec![degenerate]).batches(),
            Err(InstanceError::MissingTopology)
        );
    }

    #[test]
    fn test_instance_display() {
        let inst = Instance::new(
            Action::named("Person"),
            Topology::from_components(&[ComponentType::Who, ComponentType::What]),
            vec![Value::from("Ann"), Value::Void],
        );
        assert_eq!(inst.to_string(), "INSTANCE(Person - 1,2): [Ann,None]");
    }
}
