//! Markup-tree parsing and element selection.

pub mod document;
pub mod path;

pub use document::{XmlDocument, XmlError, XmlNode};
pub use path::{ElementPath, PathError};
