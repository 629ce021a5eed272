//! Elements: extraction units that turn one record into instance positions.
//!
//! Every element appends zero or more `(component, value, label)` triples to
//! an [`Accumulator`] and reports the outcome as an [`Extraction`]. A
//! rejection abandons the whole record for the element list being run.

use crate::extraction::{Extractor, Locator};
use crate::loader::context::ExtractionContext;
use crate::transform_registry::{apply_all, Combinator, Transform};
use crate::types::{ComponentType, DataType, Value};
use crate::xml::ElementPath;

/// Values treated as absent in delimited rows
pub const DEFAULT_COLUMN_NA: [&str; 3] = ["", "n/a", "N/A"];

/// Parallel component/value/label sequences of one record in progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    components: Vec<ComponentType>,
    values: Vec<Value>,
    labels: Vec<String>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, component: ComponentType, value: Value, label: &str) {
        self.components.push(component);
        self.values.push(value);
        self.labels.push(label.to_string());
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[ComponentType] {
        &self.components
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn into_parts(self) -> (Vec<ComponentType>, Vec<Value>, Vec<String>) {
        (self.components, self.values, self.labels)
    }
}

/// Outcome of running one element against one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// This many positions were appended
    Appended(usize),
    /// Optional value absent; nothing appended, the record continues
    Declined,
    /// The record cannot be built from this element list
    Rejected(String),
}

/// A constant value
#[derive(Debug, Clone, PartialEq)]
pub struct FixedElement {
    pub value: Value,
    pub component: ComponentType,
    pub label: String,
}

impl FixedElement {
    pub fn new(value: Value, component: ComponentType) -> Self {
        Self {
            value,
            component,
            label: String::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// A value looked up by column (rows) or path (tree nodes)
#[derive(Debug, Clone)]
pub struct ValueElement {
    pub locator: Locator,
    pub data_type: DataType,
    pub component: ComponentType,
    pub label: String,
    pub required: bool,
    pub default: Option<Value>,
    pub allow_void: bool,
    pub na_values: Vec<String>,
    pub transforms: Vec<Transform>,
}

impl ValueElement {
    fn with_locator(locator: Locator, data_type: DataType, component: ComponentType) -> Self {
        Self {
            locator,
            data_type,
            component,
            label: String::new(),
            required: true,
            default: None,
            allow_void: true,
            na_values: Vec::new(),
            transforms: Vec::new(),
        }
    }

    /// Element reading the zero-based `index` field of a row
    ///
    /// # Example
    ///
    /// ```
    /// use dynaload::loader::ValueElement;
    /// use dynaload::types::{ComponentType, DataType};
    ///
    /// let age = ValueElement::column(2, DataType::Integer, ComponentType::What)
    ///     .label("age")
    ///     .allow_void(false);
    /// assert!(age.required);
    /// assert_eq!(age.na_values, vec!["", "n/a", "N/A"]);
    /// ```
    pub fn column(index: usize, data_type: DataType, component: ComponentType) -> Self {
        let mut element = Self::with_locator(Locator::Column(index), data_type, component);
        element.na_values = DEFAULT_COLUMN_NA.iter().map(|s| s.to_string()).collect();
        element
    }

    /// Element selecting the text of every node matched by `path`
    pub fn path(path: ElementPath, data_type: DataType, component: ComponentType) -> Self {
        let mut element = Self::with_locator(Locator::Path(path), data_type, component);
        element.na_values = vec![String::new()];
        element
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn allow_void(mut self, allow_void: bool) -> Self {
        self.allow_void = allow_void;
        self
    }

    pub fn na_values<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.na_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    fn extract<R: Extractor + ?Sized>(&self, record: &R, out: &mut Accumulator) -> Extraction {
        let present: Vec<String> = record
            .select(&self.locator)
            .into_iter()
            .filter(|raw| !self.na_values.iter().any(|na| na == raw))
            .collect();

        if present.is_empty() {
            return self.absent(out);
        }

        // Validate every match before appending any of them.
        let mut values = Vec::with_capacity(present.len());
        for raw in &present {
            match coerce(self.data_type, &self.transforms, raw) {
                Ok(value) => values.push(value),
                Err(reason) => return Extraction::Rejected(format!("{}: {}", self.locator, reason)),
            }
        }

        let appended = values.len();
        for value in values {
            out.push(self.component, value, &self.label);
        }
        Extraction::Appended(appended)
    }

    fn absent(&self, out: &mut Accumulator) -> Extraction {
        if !self.required {
            return Extraction::Declined;
        }
        match (&self.default, self.allow_void) {
            (Some(default), _) => out.push(self.component, default.clone(), &self.label),
            (None, true) => out.push(self.component, Value::Void, &self.label),
            (None, false) => {
                return Extraction::Rejected(format!("{}: required value missing", self.locator))
            }
        }
        Extraction::Appended(1)
    }
}

/// Several values joined into one string
#[derive(Debug, Clone)]
pub struct CombinationElement {
    pub locators: Vec<Locator>,
    pub component: ComponentType,
    pub label: String,
    pub required: bool,
    pub combinator: Combinator,
    /// Joins multiple matches of one path before combining
    pub sequence_separator: String,
}

impl CombinationElement {
    pub fn new(locators: Vec<Locator>, component: ComponentType) -> Self {
        Self {
            locators,
            component,
            label: String::new(),
            required: true,
            combinator: Combinator::default(),
            sequence_separator: ",".to_string(),
        }
    }

    /// Combination of row fields
    pub fn columns(indices: &[usize], component: ComponentType) -> Self {
        Self::new(indices.iter().map(|&i| Locator::Column(i)).collect(), component)
    }

    /// Combination of node texts
    pub fn paths(paths: Vec<ElementPath>, component: ComponentType) -> Self {
        Self::new(paths.into_iter().map(Locator::Path).collect(), component)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn combinator(mut self, combinator: Combinator) -> Self {
        self.combinator = combinator;
        self
    }

    pub fn sequence_separator(mut self, separator: impl Into<String>) -> Self {
        self.sequence_separator = separator.into();
        self
    }

    fn extract<R: Extractor + ?Sized>(&self, record: &R, out: &mut Accumulator) -> Extraction {
        let pieces: Vec<String> = self
            .locators
            .iter()
            .map(|locator| record.select(locator).join(&self.sequence_separator))
            .collect();

        let joined = self.combinator.combine(&pieces);
        if joined.is_empty() && !self.required {
            return Extraction::Rejected("combination is empty".to_string());
        }
        out.push(self.component, Value::String(joined), &self.label);
        Extraction::Appended(1)
    }
}

/// A value bound from the current loop-variable combination
#[derive(Debug, Clone)]
pub struct VariableElement {
    pub loop_index: usize,
    pub variable_index: usize,
    pub data_type: DataType,
    pub component: ComponentType,
    pub label: String,
    pub transforms: Vec<Transform>,
}

impl VariableElement {
    pub fn new(
        loop_index: usize,
        variable_index: usize,
        data_type: DataType,
        component: ComponentType,
    ) -> Self {
        Self {
            loop_index,
            variable_index,
            data_type,
            component,
            label: String::new(),
            transforms: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    fn extract(&self, ctx: &ExtractionContext, out: &mut Accumulator) -> Extraction {
        let Some(raw) = ctx.variable(self.loop_index, self.variable_index) else {
            return Extraction::Rejected(format!(
                "variable [{}][{}] is not bound",
                self.loop_index, self.variable_index
            ));
        };
        match coerce(self.data_type, &self.transforms, raw) {
            Ok(value) => {
                out.push(self.component, value, &self.label);
                Extraction::Appended(1)
            }
            Err(reason) => Extraction::Rejected(format!(
                "variable [{}][{}]: {}",
                self.loop_index, self.variable_index, reason
            )),
        }
    }
}

/// One extraction unit of a mapping
#[derive(Debug, Clone)]
pub enum Element {
    Fixed(FixedElement),
    Value(ValueElement),
    Combination(CombinationElement),
    Variable(VariableElement),
}

impl Element {
    /// Run the element against one record
    pub fn extract<R: Extractor + ?Sized>(
        &self,
        record: &R,
        ctx: &ExtractionContext,
        out: &mut Accumulator,
    ) -> Extraction {
        match self {
            Element::Fixed(fixed) => {
                out.push(fixed.component, fixed.value.clone(), &fixed.label);
                Extraction::Appended(1)
            }
            Element::Value(value) => value.extract(record, out),
            Element::Combination(combination) => combination.extract(record, out),
            Element::Variable(variable) => variable.extract(ctx, out),
        }
    }

    pub fn component(&self) -> ComponentType {
        match self {
            Element::Fixed(e) => e.component,
            Element::Value(e) => e.component,
            Element::Combination(e) => e.component,
            Element::Variable(e) => e.component,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Element::Fixed(e) => &e.label,
            Element::Value(e) => &e.label,
            Element::Combination(e) => &e.label,
            Element::Variable(e) => &e.label,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Element::Fixed(_) => "fixed",
            Element::Value(e) if e.locator.is_column() => "column",
            Element::Value(_) => "path",
            Element::Combination(_) => "combination",
            Element::Variable(_) => "variable",
        }
    }

    /// Locators this element reads from the record
    pub fn locators(&self) -> Vec<&Locator> {
        match self {
            Element::Value(e) => vec![&e.locator],
            Element::Combination(e) => e.locators.iter().collect(),
            Element::Fixed(_) | Element::Variable(_) => Vec::new(),
        }
    }

    /// `(loop_index, variable_index)` of a variable element
    pub fn variable_ref(&self) -> Option<(usize, usize)> {
        match self {
            Element::Variable(e) => Some((e.loop_index, e.variable_index)),
            _ => None,
        }
    }
}

impl From<FixedElement> for Element {
    fn from(element: FixedElement) -> Self {
        Element::Fixed(element)
    }
}

impl From<ValueElement> for Element {
    fn from(element: ValueElement) -> Self {
        Element::Value(element)
    }
}

impl From<CombinationElement> for Element {
    fn from(element: CombinationElement) -> Self {
        Element::Combination(element)
    }
}

impl From<VariableElement> for Element {
    fn from(element: VariableElement) -> Self {
        Element::Variable(element)
    }
}

fn coerce(data_type: DataType, transforms: &[Transform], raw: &str) -> Result<Value, String> {
    let text = apply_all(transforms, raw).map_err(|e| e.to_string())?;
    Value::parse(data_type, &text).map_err(|e| e.to_string())
}
