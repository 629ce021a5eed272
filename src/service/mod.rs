//! The remote store as seen by the loaders.
//!
//! Loaders talk to the store only through the [`Service`] trait: four
//! synchronous round-trips for actions, topologies, labels and instance
//! batches. Transport, sessions and retries belong to the implementation.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryService`] - an in-process store, used by tests and `validate`
//! - [`NdjsonService`] - writes every request as one JSON line, for dry runs
//!   and exports

pub mod memory;
pub mod ndjson;

pub use memory::{CallLog, MemoryService};
pub use ndjson::NdjsonService;

use crate::serialization::SerializationError;
use crate::types::{Action, InstanceBatches, InstanceError, Labels, Topology};
use std::fmt;

/// The remote operations a loader issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAction,
    CreateTopology,
    CreateLabels,
    BatchCreate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateAction => "create_action",
            Operation::CreateTopology => "create_topology",
            Operation::CreateLabels => "create_labels",
            Operation::BatchCreate => "batch_create",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error raised by a service call
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{operation} rejected: {message}")]
    Rejected { operation: Operation, message: String },

    #[error("invalid {operation} request: {message}")]
    InvalidRequest { operation: Operation, message: String },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid instance batch: {0}")]
    Batch(#[from] InstanceError),

    #[error("failed to write request: {0}")]
    Serialization(#[from] SerializationError),
}

/// Client-side interface of the graph store
///
/// Implementations are synchronous. `create_action` is expected to be
/// idempotent by name; `create_labels` and `batch_create_instances` report
/// success as a flag in addition to hard errors.
///
/// # Example
///
/// ```
/// use dynaload::service::{MemoryService, Service};
/// use dynaload::types::{Action, ComponentType, Topology};
///
/// let mut service = MemoryService::new();
/// let action = service.create_action(&Action::named("visits")).unwrap();
/// assert!(action.id.is_some());
///
/// let topology = service
///     .create_topology(&Topology::from_components(&[ComponentType::Who, ComponentType::Where]))
///     .unwrap();
/// assert_eq!(topology.shape_key(), "1,3");
/// ```
pub trait Service {
    /// Create the action, or resolve an existing one with the same name
    fn create_action(&mut self, action: &Action) -> Result<Action, ServiceError>;

    /// Create a topology for the given component sequence
    fn create_topology(&mut self, topology: &Topology) -> Result<Topology, ServiceError>;

    /// Attach labels to an action/topology pair
    fn create_labels(&mut self, labels: &Labels) -> Result<bool, ServiceError>;

    /// Create every instance of the batch
    fn batch_create_instances(&mut self, batches: &InstanceBatches) -> Result<bool, ServiceError>;
}

impl<S: Service + ?Sized> Service for Box<S> {
    fn create_action(&mut self, action: &Action) -> Result<Action, ServiceError> {
        (**self).create_action(action)
    }

    fn create_topology(&mut self, topology: &Topology) -> Result<Topology, ServiceError> {
        (**self).create_topology(topology)
    }

    fn create_labels(&mut self, labels: &Labels) -> Result<bool, ServiceError> {
        (**self).create_labels(labels)
    }

    fn batch_create_instances(&mut self, batches: &InstanceBatches) -> Result<bool, ServiceError> {
        (**self).batch_create_instances(batches)
    }
}
