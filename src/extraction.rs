//! Format-agnostic value selection from external records.
//!
//! A record is either one delimited row (an ordered list of fields) or one
//! node of a markup tree. Elements address values inside a record through a
//! [`Locator`], and records answer through the [`Extractor`] trait, so the
//! element logic is shared between both loaders.

use crate::xml::{ElementPath, PathError, XmlNode};
use indexmap::IndexMap;
use std::fmt;

/// Address of a value inside one record
///
/// # Examples
///
/// - Row: `Locator::Column(2)` - third field of the row
/// - Tree: `Locator::Path(..)` compiled from `title`, `author[@role='main']`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Zero-based field index within a row
    Column(usize),
    /// Selector evaluated relative to a tree node
    Path(ElementPath),
}

impl Locator {
    /// Compile a tree locator, resolving prefixes through `namespaces`
    pub fn path(path: &str, namespaces: &IndexMap<String, String>) -> Result<Self, PathError> {
        ElementPath::parse_with_namespaces(path, namespaces).map(Locator::Path)
    }

    pub fn is_column(&self) -> bool {
        matches!(self, Locator::Column(_))
    }

    pub fn is_path(&self) -> bool {
        matches!(self, Locator::Path(_))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Column(index) => write!(f, "column[{}]", index),
            Locator::Path(path) => write!(f, "{}", path),
        }
    }
}

/// Trait for records that can hand out raw text by locator
///
/// Implementations return every match in source order: rows yield at most one
/// value, tree nodes one value per selected element. A locator of the wrong
/// kind for the record yields no values.
///
/// # Example
///
/// ```
/// use dynaload::{Extractor, Locator};
///
/// let row = vec!["42".to_string(), "Ada".to_string()];
/// assert_eq!(row.as_slice().select(&Locator::Column(1)), vec!["Ada".to_string()]);
/// assert!(row.as_slice().select(&Locator::Column(5)).is_empty());
/// ```
pub trait Extractor {
    /// All raw values at the given locator
    fn select(&self, locator: &Locator) -> Vec<String>;

    /// First value at the locator, if any
    fn select_first(&self, locator: &Locator) -> Option<String> {
        self.select(locator).into_iter().next()
    }

    /// Extract the first value and parse it to a specific type
    fn select_as<T>(&self, locator: &Locator) -> Option<T>
    where
        T: std::str::FromStr,
    {
        self.select_first(locator).and_then(|s| s.parse().ok())
    }
}

impl Extractor for [String] {
    fn select(&self, locator: &Locator) -> Vec<String> {
        match locator {
            Locator::Column(index) => self.get(*index).cloned().into_iter().collect(),
            Locator::Path(_) => Vec::new(),
        }
    }
}

impl Extractor for Vec<String> {
    fn select(&self, locator: &Locator) -> Vec<String> {
        self.as_slice().select(locator)
    }
}

impl Extractor for XmlNode<'_> {
    fn select(&self, locator: &Locator) -> Vec<String> {
        match locator {
            Locator::Path(path) => path.find_texts(*self),
            Locator::Column(_) => Vec::new(),
        }
    }
}
