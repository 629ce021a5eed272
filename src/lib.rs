//! # Dynaload: Bulk Loading into a Graph Store
//!
//! Dynaload maps records from delimited-text files and markup trees onto the
//! graph store's data model: every record becomes an instance of an action,
//! shaped by a topology of component roles.
//!
//! ## Features
//!
//! - **Element lists**: fixed values, columns or paths, combinations of several
//!   locators and loop variables, each coerced to a data type
//! - **Fallbacks**: a second element list tried when the primary one rejects a record
//! - **Loop variables**: Cartesian expansion of tree values into templated root paths
//! - **Topology memo**: each distinct shape and its labels are created once per mapping
//! - **Batching**: instances are pushed in batches of a configurable size
//! - **Transform registry**: named text transforms usable from YAML job files
//!
//! ## Example: YAML Job
//!
//! ```yaml
//! source:
//!   kind: tree
//!   path: library.xml
//! mappings:
//!   - action: shelved
//!     root: "shelf[@code='{0}']/book"
//!     loops:
//!       - { path: codes/code, variables: ["."] }
//!     elements:
//!       - { kind: path, path: title, component: what, label: title }
//!       - { kind: path, path: author, component: who, label: author }
//!       - { kind: variable, loop_index: 0, component: where, label: shelf }
//! ```
//!
//! ## Example: Programmatic Loader
//!
//! ```
//! use dynaload::loader::{FixedElement, Loader, Mapping, TreeLoader, TreeMapping, ValueElement};
//! use dynaload::service::MemoryService;
//! use dynaload::types::{Action, ComponentType, DataType, Value};
//! use dynaload::xml::ElementPath;
//!
//! let mut loader = TreeLoader::parse_str("<r><p><n>ada</n></p><p><n>alan</n></p></r>").unwrap();
//! let mapping = Mapping::new(
//!     Action::named("person"),
//!     vec![
//!         ValueElement::path(ElementPath::parse("n").unwrap(), DataType::String, ComponentType::Who).into(),
//!         FixedElement::new(Value::from("human"), ComponentType::What).into(),
//!     ],
//! );
//! loader.add_mapping(TreeMapping::new(mapping, "p").unwrap()).unwrap();
//!
//! let mut service = MemoryService::new();
//! let summary = loader.run(&mut service).unwrap();
//! assert_eq!(summary.instances_pushed(), 2);
//! assert_eq!(service.topology_count(), 1);
//! ```

// Core modules
pub mod types;
pub mod transform_registry;
pub mod extraction;
pub mod serialization;

// Sources
pub mod xml;

// Remote store interface
pub mod service;

// Loaders and job files
pub mod loader;
pub mod config;

// Re-export key types
pub use transform_registry::{Combinator, Transform, TransformError, TransformRegistry};
pub use extraction::{Extractor, Locator};
pub use service::{Service, ServiceError};
pub use loader::{DelimitedLoader, Loader, LoaderError, Mapping, TreeLoader, TreeMapping};
pub use config::{ConfigError, JobConfig};
