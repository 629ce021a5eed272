//! Bulk loaders.
//!
//! A loader owns a source and a list of mappings. Running it walks the
//! source once per mapping:
//!
//! 1. create (or resolve) the mapping's action
//! 2. for tree sources with loop variables, expand the variable combinations
//! 3. walk every record of every resolved root, with fallback elements for
//!    records the primary elements reject
//! 4. create each distinct topology shape and its labels once
//! 5. push instances in batches, then push the remainder
//!
//! Remote failures abort the run with a [`LoaderError`]; label failures are
//! logged and counted.

pub mod context;
pub mod delimited;
pub mod element;
pub mod error;
pub mod expand;
pub mod mapping;
pub mod memo;
pub mod pusher;
pub mod summary;
pub mod tree;
pub mod walker;

pub use context::{Combination, ExtractionContext, Tuple};
pub use delimited::{DelimitedFormat, DelimitedLoader};
pub use element::{
    Accumulator, CombinationElement, Element, Extraction, FixedElement, ValueElement,
    VariableElement,
};
pub use error::LoaderError;
pub use expand::{LoopVariable, RootTemplate};
pub use mapping::{Mapping, SourceKind, TreeMapping, DEFAULT_BATCH_SIZE};
pub use memo::TopologyMemo;
pub use pusher::BatchPusher;
pub use summary::{LoadSummary, MappingSummary};
pub use tree::TreeLoader;
pub use walker::{Attempt, MappingRun, Pass};

use crate::service::Service;

/// A source plus the mappings to run over it
pub trait Loader {
    /// Run every mapping in order against `service`
    fn run(&mut self, service: &mut dyn Service) -> Result<LoadSummary, LoaderError>;

    /// Check mappings and source without issuing any remote call
    fn validate(&self) -> Result<(), LoaderError>;

    fn mapping_count(&self) -> usize;
}
