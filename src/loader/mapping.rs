//! Mappings: how records of a source become instances of one action.

use crate::loader::element::Element;
use crate::loader::error::LoaderError;
use crate::loader::expand::{LoopVariable, RootTemplate};
use crate::types::Action;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Kind of source a mapping runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Delimited,
    Tree,
}

/// Primary and fallback element lists for one action
#[derive(Debug, Clone)]
pub struct Mapping {
    action: Action,
    elements: Vec<Element>,
    fallback: Vec<Element>,
    batch_size: usize,
}

impl Mapping {
    /// # Example
    ///
    /// ```
    /// use dynaload::loader::{Mapping, ValueElement};
    /// use dynaload::types::{Action, ComponentType, DataType};
    ///
    /// let mapping = Mapping::new(
    ///     Action::named("visits"),
    ///     vec![
    ///         ValueElement::column(0, DataType::String, ComponentType::Who).into(),
    ///         ValueElement::column(1, DataType::String, ComponentType::Where).into(),
    ///     ],
    /// )
    /// .batch_size(500);
    ///
    /// assert_eq!(mapping.batch_size_limit(), 500);
    /// assert!(mapping.fallback_elements().is_empty());
    /// ```
    pub fn new(action: Action, elements: Vec<Element>) -> Self {
        Self {
            action,
            elements,
            fallback: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn fallback(mut self, fallback: Vec<Element>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn fallback_elements(&self) -> &[Element] {
        &self.fallback
    }

    pub fn batch_size_limit(&self) -> usize {
        self.batch_size
    }

    /// Check the mapping can run against `kind`. `loop_widths[i]` is the
    /// number of variable paths of loop definition `i` (tree mappings).
    pub fn validate(&self, kind: SourceKind, loop_widths: &[usize]) -> Result<(), LoaderError> {
        let action = self.action.display_name();

        if self.action.id.is_none() && self.action.name.is_none() {
            return Err(LoaderError::invalid(&action, "action needs a name or an id"));
        }
        if self.batch_size == 0 {
            return Err(LoaderError::invalid(&action, "batch size must be at least 1"));
        }
        if self.elements.is_empty() {
            return Err(LoaderError::invalid(&action, "mapping has no elements"));
        }

        let lists = [("elements", &self.elements), ("fallback", &self.fallback)];
        for (list, elements) in lists {
            for (idx, element) in elements.iter().enumerate() {
                let at = |message: String| {
                    LoaderError::invalid(
                        &action,
                        format!("{}[{}] ({}): {}", list, idx, element.kind(), message),
                    )
                };

                for locator in element.locators() {
                    match kind {
                        SourceKind::Delimited if locator.is_path() => {
                            return Err(at("paths cannot be used with delimited sources".into()))
                        }
                        SourceKind::Tree if locator.is_column() => {
                            return Err(at("columns cannot be used with tree sources".into()))
                        }
                        _ => {}
                    }
                }

                if let Some((loop_index, variable_index)) = element.variable_ref() {
                    if kind == SourceKind::Delimited {
                        return Err(at("variables need a tree source with loops".into()));
                    }
                    check_variable(loop_widths, loop_index, variable_index).map_err(at)?;
                }
            }
        }
        Ok(())
    }
}

fn check_variable(
    loop_widths: &[usize],
    loop_index: usize,
    variable_index: usize,
) -> Result<(), String> {
    match loop_widths.get(loop_index) {
        None => Err(format!(
            "loop index {} out of range ({} loops declared)",
            loop_index,
            loop_widths.len()
        )),
        Some(&width) if variable_index >= width => Err(format!(
            "variable index {} out of range (loop {} has {} variables)",
            variable_index, loop_index, width
        )),
        Some(_) => Ok(()),
    }
}

/// A mapping over the nodes selected by a (templated) root path
#[derive(Debug, Clone)]
pub struct TreeMapping {
    pub mapping: Mapping,
    pub root: RootTemplate,
    pub loops: Vec<LoopVariable>,
}

impl TreeMapping {
    pub fn new(mapping: Mapping, root: &str) -> Result<Self, LoaderError> {
        let root = RootTemplate::parse(root)
            .map_err(|message| LoaderError::invalid(&mapping.action.display_name(), message))?;
        Ok(Self {
            mapping,
            root,
            loops: Vec::new(),
        })
    }

    pub fn loop_variable(mut self, variable: LoopVariable) -> Self {
        self.loops.push(variable);
        self
    }

    pub fn validate(&self) -> Result<(), LoaderError> {
        let widths: Vec<usize> = self.loops.iter().map(|l| l.variable_paths.len()).collect();
        self.mapping.validate(SourceKind::Tree, &widths)?;

        for (loop_index, variable_index) in self.root.slots() {
            check_variable(&widths, loop_index, variable_index).map_err(|message| {
                LoaderError::invalid(
                    &self.mapping.action.display_name(),
                    format!("root '{}': {}", self.root, message),
                )
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::element::{FixedElement, ValueElement, VariableElement};
    use crate::types::{ComponentType, DataType, Value};
    use crate::xml::ElementPath;

    fn column(i: usize) -> Element {
        ValueElement::column(i, DataType::String, ComponentType::Who).into()
    }

    fn path(p: &str) -> Element {
        ValueElement::path(ElementPath::parse(p).unwrap(), DataType::String, ComponentType::What)
            .into()
    }

    fn expect_invalid(result: Result<(), LoaderError>, needle: &str) {
        match result {
            Err(LoaderError::InvalidMapping { message, .. }) => {
                assert!(message.contains(needle), "{} does not mention {}", message, needle)
            }
            other => panic!("expected invalid mapping, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_delimited_mapping() {
        let mapping = Mapping::new(Action::named("a"), vec![column(0), column(1)])
            .fallback(vec![column(0), FixedElement::new(Value::from("?"), ComponentType::What).into()]);
        assert!(mapping.validate(SourceKind::Delimited, &[]).is_ok());
    }

    #[test]
    fn test_batch_size_and_empty_mapping() {
        let zero = Mapping::new(Action::named("a"), vec![column(0)]).batch_size(0);
        expect_invalid(zero.validate(SourceKind::Delimited, &[]), "batch size");

        let empty = Mapping::new(Action::named("a"), Vec::new());
        expect_invalid(empty.validate(SourceKind::Delimited, &[]), "no elements");

        let anonymous = Mapping::new(Action::default(), vec![column(0)]);
        expect_invalid(anonymous.validate(SourceKind::Delimited, &[]), "name or an id");
    }

    #[test]
    fn test_locator_kinds_must_match_source() {
        let mixed = Mapping::new(Action::named("a"), vec![column(0), path("x")]);
        expect_invalid(mixed.validate(SourceKind::Delimited, &[]), "elements[1] (path)");
        expect_invalid(mixed.validate(SourceKind::Tree, &[]), "elements[0] (column)");
    }

    #[test]
    fn test_variables_need_declared_loops() {
        let variable: Element =
            VariableElement::new(0, 1, DataType::String, ComponentType::When).into();
        let delimited =
            Mapping::new(Action::named("a"), vec![column(0)]).fallback(vec![variable.clone()]);
        expect_invalid(delimited.validate(SourceKind::Delimited, &[]), "tree source");

        let mapping = Mapping::new(Action::named("a"), vec![path("x")]).fallback(vec![variable]);
        expect_invalid(mapping.validate(SourceKind::Tree, &[]), "loop index 0");
        expect_invalid(mapping.validate(SourceKind::Tree, &[1]), "variable index 1");
        assert!(mapping.validate(SourceKind::Tree, &[2]).is_ok());
    }

    #[test]
    fn test_tree_mapping_root_slots() {
        let mapping = Mapping::new(Action::named("a"), vec![path("x"), path("y")]);
        let plain = TreeMapping::new(mapping.clone(), "record").unwrap();
        assert!(plain.validate().is_ok());

        let templated = TreeMapping::new(mapping.clone(), "group[@id='{0}']/record").unwrap();
        expect_invalid(templated.validate(), "root");

        let looped = templated.loop_variable(LoopVariable::new(
            ElementPath::parse("group").unwrap(),
            vec![ElementPath::parse("id").unwrap()],
        ));
        assert!(looped.validate().is_ok());
    }
}
