//! YAML job files.
//!
//! A job names one source and the mappings to run over it:
//!
//! ```yaml
//! source:
//!   kind: delimited
//!   path: visits.csv
//!   header_count: 1
//! mappings:
//!   - action: visited
//!     batch_size: 500
//!     elements:
//!       - { kind: column, index: 0, component: who, label: person }
//!       - { kind: column, index: 2, component: where, label: city,
//!           transforms: [ { name: trim }, { name: uppercase } ] }
//!     fallback:
//!       - { kind: column, index: 0, component: who, label: person }
//!       - { kind: fixed, value: unknown, component: where, label: city }
//! ```
//!
//! Tree sources take `namespaces`, and their mappings a `root` path template
//! plus optional `loops` (`{ path, variables: [...] }`). Relative source
//! paths are resolved against the directory of the job file.

use crate::extraction::Locator;
use crate::loader::{
    CombinationElement, DelimitedFormat, DelimitedLoader, Element, FixedElement, Loader,
    LoaderError, LoopVariable, Mapping, SourceKind, TreeLoader, TreeMapping, ValueElement,
    VariableElement, DEFAULT_BATCH_SIZE,
};
use crate::transform_registry::{Combinator, Transform, TransformError, TransformRegistry};
use crate::types::{Action, ComponentType, DataType, Value, ValueError};
use crate::xml::{ElementPath, PathError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Error raised while loading or compiling a job
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("mapping {mapping}: {message}")]
    Invalid { mapping: String, message: String },

    #[error("mapping {mapping}: {source}")]
    Transform {
        mapping: String,
        #[source]
        source: TransformError,
    },

    #[error("mapping {mapping}: {source}")]
    Path {
        mapping: String,
        #[source]
        source: PathError,
    },

    #[error("mapping {mapping}: {source}")]
    Value {
        mapping: String,
        #[source]
        source: ValueError,
    },

    #[error(transparent)]
    Loader(#[from] LoaderError),
}

/// A whole job: one source, several mappings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub mappings: Vec<MappingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Delimited(DelimitedSourceConfig),
    Tree(TreeSourceConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelimitedSourceConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub header_count: usize,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_quote")]
    pub quote: String,
    #[serde(default)]
    pub escape: Option<String>,
    #[serde(default = "default_true")]
    pub double_quote: bool,
    #[serde(default)]
    pub terminator: Option<String>,
    #[serde(default)]
    pub skip_initial_space: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSourceConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub namespaces: IndexMap<String, String>,
}

/// Action by existing id or by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionConfig {
    Id(u64),
    Name(String),
}

impl ActionConfig {
    fn to_action(&self) -> Action {
        match self {
            ActionConfig::Id(id) => Action::with_id(*id),
            ActionConfig::Name(name) => Action::named(name.clone()),
        }
    }
}

impl fmt::Display for ActionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionConfig::Id(id) => write!(f, "#{}", id),
            ActionConfig::Name(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    pub action: ActionConfig,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Root path template (tree sources)
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub loops: Vec<LoopConfig>,
    pub elements: Vec<ElementConfig>,
    #[serde(default)]
    pub fallback: Vec<ElementConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    pub path: String,
    #[serde(default)]
    pub variables: Vec<String>,
}

/// YAML scalar given as a constant or default value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Boolean(b) => write!(f, "{}", b),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    pub name: String,
    #[serde(default)]
    pub args: HashMap<String, JsonValue>,
}

/// Options shared by column and path elements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueConfig {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_data_type")]
    pub data_type: DataType,
    pub component: ComponentType,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Scalar>,
    #[serde(default = "default_true")]
    pub allow_void: bool,
    #[serde(default)]
    pub na_values: Option<Vec<String>>,
    #[serde(default)]
    pub transforms: Vec<TransformConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementConfig {
    Fixed {
        value: Scalar,
        #[serde(default = "default_data_type")]
        data_type: DataType,
        component: ComponentType,
        #[serde(default)]
        label: String,
    },
    Column(ValueConfig),
    Path(ValueConfig),
    Combination {
        #[serde(default)]
        indices: Vec<usize>,
        #[serde(default)]
        paths: Vec<String>,
        component: ComponentType,
        #[serde(default)]
        label: String,
        #[serde(default = "default_true")]
        required: bool,
        /// Joins the non-empty pieces; a single space when absent
        #[serde(default)]
        separator: Option<String>,
        #[serde(default = "default_sequence_separator")]
        sequence_separator: String,
    },
    Variable {
        loop_index: usize,
        #[serde(default)]
        variable_index: usize,
        #[serde(default = "default_data_type")]
        data_type: DataType,
        component: ComponentType,
        #[serde(default)]
        label: String,
        #[serde(default)]
        transforms: Vec<TransformConfig>,
    },
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_quote() -> String {
    "\"".to_string()
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_data_type() -> DataType {
    DataType::String
}

fn default_sequence_separator() -> String {
    ",".to_string()
}

impl JobConfig {
    /// Load a job from a YAML file; relative source paths are resolved
    /// against the file's directory.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&contents, path.parent())
    }

    /// Parse a job from YAML text
    pub fn from_yaml_str(yaml: &str, base_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let mut job: JobConfig = serde_yaml::from_str(yaml)?;
        if let Some(base) = base_dir {
            let source_path = match &mut job.source {
                SourceConfig::Delimited(source) => &mut source.path,
                SourceConfig::Tree(source) => &mut source.path,
            };
            if source_path.is_relative() {
                *source_path = base.join(&*source_path);
            }
        }
        Ok(job)
    }

    pub fn source_path(&self) -> &Path {
        match &self.source {
            SourceConfig::Delimited(source) => &source.path,
            SourceConfig::Tree(source) => &source.path,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match &self.source {
            SourceConfig::Delimited(_) => SourceKind::Delimited,
            SourceConfig::Tree(_) => SourceKind::Tree,
        }
    }

    /// Build a runnable loader. Tree sources are parsed here; delimited
    /// sources are read when the loader runs.
    pub fn compile(&self, registry: &TransformRegistry) -> Result<Box<dyn Loader>, ConfigError> {
        match &self.source {
            SourceConfig::Delimited(source) => {
                let mut loader = DelimitedLoader::from_path(&source.path)
                    .header_count(source.header_count)
                    .format(source.format()?);
                for config in &self.mappings {
                    let compiler = ElementCompiler::new(config, SourceKind::Delimited, registry);
                    if config.root.is_some() || !config.loops.is_empty() {
                        return Err(compiler.invalid("root and loops need a tree source"));
                    }
                    loader.add_mapping(compiler.mapping()?)?;
                }
                Ok(Box::new(loader))
            }
            SourceConfig::Tree(source) => {
                let mut loader =
                    TreeLoader::parse_file(&source.path)?.namespaces(source.namespaces.clone());
                for config in &self.mappings {
                    let compiler = ElementCompiler::new(config, SourceKind::Tree, registry)
                        .with_namespaces(&source.namespaces);
                    let root = config
                        .root
                        .as_deref()
                        .ok_or_else(|| compiler.invalid("tree mappings need a root"))?;

                    let mut tree = TreeMapping::new(compiler.mapping()?, root)?;
                    for lp in &config.loops {
                        let variables = lp
                            .variables
                            .iter()
                            .map(|v| compiler.path(v))
                            .collect::<Result<Vec<_>, _>>()?;
                        tree = tree.loop_variable(LoopVariable::new(compiler.path(&lp.path)?, variables));
                    }
                    loader.add_mapping(tree)?;
                }
                Ok(Box::new(loader))
            }
        }
    }
}

impl DelimitedSourceConfig {
    fn format(&self) -> Result<DelimitedFormat, ConfigError> {
        let byte = |field: &str, text: &str| -> Result<u8, ConfigError> {
            match text.as_bytes() {
                [b] => Ok(*b),
                _ => Err(ConfigError::Invalid {
                    mapping: "<source>".to_string(),
                    message: format!("{} must be a single ASCII character, got {:?}", field, text),
                }),
            }
        };

        Ok(DelimitedFormat {
            delimiter: byte("delimiter", &self.delimiter)?,
            quote: byte("quote", &self.quote)?,
            escape: self.escape.as_deref().map(|e| byte("escape", e)).transpose()?,
            double_quote: self.double_quote,
            terminator: self
                .terminator
                .as_deref()
                .map(|t| byte("terminator", t))
                .transpose()?,
            skip_initial_space: self.skip_initial_space,
        })
    }
}

/// Turns the element configs of one mapping into elements
struct ElementCompiler<'a> {
    config: &'a MappingConfig,
    kind: SourceKind,
    registry: &'a TransformRegistry,
    namespaces: Option<&'a IndexMap<String, String>>,
}

impl<'a> ElementCompiler<'a> {
    fn new(config: &'a MappingConfig, kind: SourceKind, registry: &'a TransformRegistry) -> Self {
        Self {
            config,
            kind,
            registry,
            namespaces: None,
        }
    }

    fn with_namespaces(mut self, namespaces: &'a IndexMap<String, String>) -> Self {
        self.namespaces = Some(namespaces);
        self
    }

    fn name(&self) -> String {
        self.config.action.to_string()
    }

    fn invalid(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            mapping: self.name(),
            message: message.into(),
        }
    }

    fn mapping(&self) -> Result<Mapping, ConfigError> {
        let elements = self.elements(&self.config.elements)?;
        let fallback = self.elements(&self.config.fallback)?;
        Ok(Mapping::new(self.config.action.to_action(), elements)
            .fallback(fallback)
            .batch_size(self.config.batch_size))
    }

    fn elements(&self, configs: &[ElementConfig]) -> Result<Vec<Element>, ConfigError> {
        configs.iter().map(|c| self.element(c)).collect()
    }

    fn path(&self, path: &str) -> Result<ElementPath, ConfigError> {
        let empty = IndexMap::new();
        ElementPath::parse_with_namespaces(path, self.namespaces.unwrap_or(&empty)).map_err(
            |source| ConfigError::Path {
                mapping: self.name(),
                source,
            },
        )
    }

    fn transforms(&self, configs: &[TransformConfig]) -> Result<Vec<Transform>, ConfigError> {
        configs
            .iter()
            .map(|t| {
                self.registry
                    .build(&t.name, &t.args)
                    .map_err(|source| ConfigError::Transform {
                        mapping: self.name(),
                        source,
                    })
            })
            .collect()
    }

    fn value(&self, data_type: DataType, scalar: &Scalar) -> Result<Value, ConfigError> {
        Value::parse(data_type, &scalar.to_string()).map_err(|source| ConfigError::Value {
            mapping: self.name(),
            source,
        })
    }

    fn element(&self, config: &ElementConfig) -> Result<Element, ConfigError> {
        let element: Element = match config {
            ElementConfig::Fixed {
                value,
                data_type,
                component,
                label,
            } => FixedElement::new(self.value(*data_type, value)?, *component)
                .label(label.clone())
                .into(),

            ElementConfig::Column(value) => {
                let index = value
                    .index
                    .ok_or_else(|| self.invalid("column elements need an index"))?;
                self.value_element(ValueElement::column(index, value.data_type, value.component), value)?
            }

            ElementConfig::Path(value) => {
                let path = value
                    .path
                    .as_deref()
                    .ok_or_else(|| self.invalid("path elements need a path"))?;
                let path = self.path(path)?;
                self.value_element(ValueElement::path(path, value.data_type, value.component), value)?
            }

            ElementConfig::Combination {
                indices,
                paths,
                component,
                label,
                required,
                separator,
                sequence_separator,
            } => {
                let mut locators: Vec<Locator> = indices.iter().map(|&i| Locator::Column(i)).collect();
                for path in paths {
                    locators.push(Locator::Path(self.path(path)?));
                }
                if locators.is_empty() {
                    return Err(self.invalid("combination elements need indices or paths"));
                }

                let combinator = match separator {
                    Some(separator) => Combinator::join(separator.clone()),
                    None => Combinator::default(),
                };
                CombinationElement::new(locators, *component)
                    .label(label.clone())
                    .required(*required)
                    .combinator(combinator)
                    .sequence_separator(sequence_separator.clone())
                    .into()
            }

            ElementConfig::Variable {
                loop_index,
                variable_index,
                data_type,
                component,
                label,
                transforms,
            } => {
                let mut element =
                    VariableElement::new(*loop_index, *variable_index, *data_type, *component)
                        .label(label.clone());
                element.transforms = self.transforms(transforms)?;
                element.into()
            }
        };

        if self.kind == SourceKind::Delimited && matches!(config, ElementConfig::Path(_)) {
            return Err(self.invalid("path elements need a tree source"));
        }
        Ok(element)
    }

    fn value_element(&self, mut element: ValueElement, config: &ValueConfig) -> Result<Element, ConfigError> {
        element = element
            .label(config.label.clone())
            .required(config.required)
            .allow_void(config.allow_void);
        if let Some(default) = &config.default {
            element = element.default_value(self.value(config.data_type, default)?);
        }
        if let Some(na_values) = &config.na_values {
            element = element.na_values(na_values.clone());
        }
        element.transforms = self.transforms(&config.transforms)?;
        Ok(element.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELIMITED_JOB: &str = r#"
source:
  kind: delimited
  path: visits.csv
  header_count: 1
  delimiter: ";"
mappings:
  - action: visited
    batch_size: 2
    elements:
      - { kind: column, index: 0, component: who, label: person }
      - kind: column
        index: 1
        component: where
        label: city
        default: nowhere
        transforms:
          - name: trim
          - { name: replace, args: { from: "_", to: " " } }
    fallback:
      - { kind: column, index: 0, component: who }
      - { kind: fixed, value: 0, data_type: integer, component: what }
  - action: 42
    elements:
      - { kind: combination, indices: [0, 1], component: who, separator: "/" }
      - { kind: fixed, value: true, data_type: boolean, component: what }
"#;

    #[test]
    fn test_parse_delimited_job() {
        let job = JobConfig::from_yaml_str(DELIMITED_JOB, Some(Path::new("/data/jobs"))).unwrap();

        assert_eq!(job.source_path(), Path::new("/data/jobs/visits.csv"));
        assert_eq!(job.source_kind(), SourceKind::Delimited);
        assert_eq!(job.mappings.len(), 2);
        assert_eq!(job.mappings[0].action, ActionConfig::Name("visited".to_string()));
        assert_eq!(job.mappings[1].action, ActionConfig::Id(42));
        assert_eq!(job.mappings[1].batch_size, DEFAULT_BATCH_SIZE);

        match &job.mappings[0].elements[1] {
            ElementConfig::Column(value) => {
                assert_eq!(value.index, Some(1));
                assert_eq!(value.default, Some(Scalar::Text("nowhere".to_string())));
                assert_eq!(value.transforms.len(), 2);
                assert!(value.required);
            }
            other => panic!("unexpected element {:?}", other),
        }
        match &job.mappings[0].fallback[1] {
            ElementConfig::Fixed { value, data_type, .. } => {
                assert_eq!(value, &Scalar::Integer(0));
                assert_eq!(*data_type, DataType::Integer);
            }
            other => panic!("unexpected element {:?}", other),
        }
    }

    #[test]
    fn test_compile_delimited_job() {
        let job = JobConfig::from_yaml_str(DELIMITED_JOB, None).unwrap();
        let loader = job.compile(&TransformRegistry::with_builtins()).unwrap();
        assert_eq!(loader.mapping_count(), 2);
    }

    #[test]
    fn test_unknown_transform_is_reported() {
        let yaml = r#"
source: { kind: delimited, path: x.csv }
mappings:
  - action: a
    elements:
      - { kind: column, index: 0, component: who, transforms: [ { name: shout } ] }
      - { kind: column, index: 1, component: what }
"#;
        let job = JobConfig::from_yaml_str(yaml, None).unwrap();
        let err = job.compile(&TransformRegistry::with_builtins()).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::Transform {
                source: TransformError::NotFound(_),
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_jobs() {
        let registry = TransformRegistry::with_builtins();

        let path_in_delimited = r#"
source: { kind: delimited, path: x.csv }
mappings:
  - action: a
    elements:
      - { kind: path, path: title, component: what }
      - { kind: column, index: 1, component: who }
"#;
        let job = JobConfig::from_yaml_str(path_in_delimited, None).unwrap();
        assert!(matches!(job.compile(&registry).err(), Some(ConfigError::Invalid { .. })));

        let bad_delimiter = r#"
source: { kind: delimited, path: x.csv, delimiter: "::" }
mappings: []
"#;
        let job = JobConfig::from_yaml_str(bad_delimiter, None).unwrap();
        assert!(matches!(job.compile(&registry).err(), Some(ConfigError::Invalid { .. })));

        let zero_batch = r#"
source: { kind: delimited, path: x.csv }
mappings:
  - action: a
    batch_size: 0
    elements:
      - { kind: column, index: 0, component: who }
      - { kind: column, index: 1, component: what }
"#;
        let job = JobConfig::from_yaml_str(zero_batch, None).unwrap();
        assert!(matches!(
            job.compile(&registry).err(),
            Some(ConfigError::Loader(LoaderError::InvalidMapping { .. }))
        ));

        let bad_default = r#"
source: { kind: delimited, path: x.csv }
mappings:
  - action: a
    elements:
      - { kind: column, index: 0, component: who, data_type: integer, default: many }
      - { kind: column, index: 1, component: what }
"#;
        let job = JobConfig::from_yaml_str(bad_default, None).unwrap();
        assert!(matches!(job.compile(&registry).err(), Some(ConfigError::Value { .. })));

        assert!(matches!(
            JobConfig::from_yaml_str("source: { kind: spreadsheet, path: x }", None),
            Err(ConfigError::Yaml(_))
        ));
    }
}
