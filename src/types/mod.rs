//! Domain objects exchanged with the graph store.

pub mod action;
pub mod instance;
pub mod label;
pub mod topology;
pub mod value;

pub use action::Action;
pub use instance::{ActionRef, Instance, InstanceBatch, InstanceBatches, InstanceError, TopologyRef};
pub use label::{Label, Labels};
pub use topology::{shape_key, ComponentType, Topology};
pub use value::{DataType, Decimal, Timestamp, Uri, Value, ValueError};
