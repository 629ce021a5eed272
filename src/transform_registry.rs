//! Transform registry system for registering and building text transforms.
//!
//! Elements run the raw text they extract through an ordered list of
//! [`Transform`]s before coercing it to their data type. Transforms are built
//! by named factories that take JSON arguments, so job files can refer to them
//! by name (`{ name: replace, args: { from: "-", to: "" } }`).

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Error type for transform operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("Transform not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {name}: {message}")]
    InvalidArgs { name: String, message: String },

    #[error("Execution error in {name}: {message}")]
    ExecutionError { name: String, message: String },
}

type TransformFnBox = dyn Fn(&str) -> Result<String, TransformError> + Send + Sync;

/// A named string -> string function
#[derive(Clone)]
pub struct Transform {
    name: String,
    func: Arc<TransformFnBox>,
}

impl Transform {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Result<String, TransformError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, input: &str) -> Result<String, TransformError> {
        (self.func)(input)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish()
    }
}

/// Run `input` through every transform in order
pub fn apply_all(transforms: &[Transform], input: &str) -> Result<String, TransformError> {
    transforms
        .iter()
        .try_fold(input.to_string(), |text, transform| transform.apply(&text))
}

type CombinatorFn = dyn Fn(&[String]) -> String + Send + Sync;

/// Joins the pieces gathered by a combination element
#[derive(Clone)]
pub struct Combinator {
    name: String,
    func: Arc<CombinatorFn>,
}

impl Combinator {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Join the non-empty pieces with `separator`
    pub fn join(separator: impl Into<String>) -> Self {
        let separator = separator.into();
        Self::new(format!("join({:?})", separator), move |pieces: &[String]| {
            pieces
                .iter()
                .filter(|piece| !piece.is_empty())
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(&separator)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn combine(&self, pieces: &[String]) -> String {
        (self.func)(pieces)
    }
}

impl Default for Combinator {
    fn default() -> Self {
        Self::join(" ")
    }
}

impl fmt::Debug for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Combinator").field("name", &self.name).finish()
    }
}

/// Arguments passed to a transform factory
pub type TransformArgs = HashMap<String, JsonValue>;

type FactoryFn = dyn Fn(&TransformArgs) -> Result<Transform, TransformError> + Send + Sync;

/// Registry of named transform factories
pub struct TransformRegistry {
    factories: HashMap<String, Box<FactoryFn>>,
}

impl TransformRegistry {
    /// Create a new empty transform registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in transforms
    ///
    /// `trim`, `lowercase`, `uppercase`, `collapse_whitespace`,
    /// `strip_prefix {prefix}`, `strip_suffix {suffix}`, `replace {from, to}`,
    /// `regex_replace {pattern, replacement}`, `regex_extract {pattern, group?}`
    /// and `parse_date {format}` (to Unix seconds).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_simple("trim", |s| s.trim().to_string());
        registry.register_simple("lowercase", |s| s.to_lowercase());
        registry.register_simple("uppercase", |s| s.to_uppercase());
        registry.register_simple("collapse_whitespace", |s| {
            s.split_whitespace().collect::<Vec<_>>().join(" ")
        });

        registry.register("strip_prefix", |args| {
            let prefix = string_arg("strip_prefix", args, "prefix")?;
            Ok(Transform::new("strip_prefix", move |s| {
                Ok(s.strip_prefix(prefix.as_str()).unwrap_or(s).to_string())
            }))
        });

        registry.register("strip_suffix", |args| {
            let suffix = string_arg("strip_suffix", args, "suffix")?;
            Ok(Transform::new("strip_suffix", move |s| {
                Ok(s.strip_suffix(suffix.as_str()).unwrap_or(s).to_string())
            }))
        });

        registry.register("replace", |args| {
            let from = string_arg("replace", args, "from")?;
            let to = string_arg("replace", args, "to")?;
            Ok(Transform::new("replace", move |s| Ok(s.replace(&from, &to))))
        });

        registry.register("regex_replace", |args| {
            let re = regex_arg("regex_replace", args)?;
            let replacement = string_arg("regex_replace", args, "replacement")?;
            Ok(Transform::new("regex_replace", move |s| {
                Ok(re.replace_all(s, replacement.as_str()).into_owned())
            }))
        });

        registry.register("regex_extract", |args| {
            let re = regex_arg("regex_extract", args)?;
            let group = match args.get("group") {
                None => 0,
                Some(value) => value.as_u64().ok_or_else(|| TransformError::InvalidArgs {
                    name: "regex_extract".to_string(),
                    message: "'group' must be a non-negative integer".to_string(),
                })? as usize,
            };
            Ok(Transform::new("regex_extract", move |s| {
                re.captures(s)
                    .and_then(|caps| caps.get(group))
                    .map(|m| m.as_str().to_string())
                    .ok_or_else(|| TransformError::ExecutionError {
                        name: "regex_extract".to_string(),
                        message: format!("no match in '{}'", s),
                    })
            }))
        });

        registry.register("parse_date", |args| {
            let format = string_arg("parse_date", args, "format")?;
            Ok(Transform::new("parse_date", move |s| {
                parse_date(s.trim(), &format).map_err(|message| TransformError::ExecutionError {
                    name: "parse_date".to_string(),
                    message,
                })
            }))
        });

        registry
    }

    /// Register a transform factory
    ///
    /// # Example
    ///
    /// ```
    /// use dynaload::{Transform, TransformRegistry};
    ///
    /// let mut registry = TransformRegistry::new();
    /// registry.register("reverse", |_args| {
    ///     Ok(Transform::new("reverse", |s| Ok(s.chars().rev().collect())))
    /// });
    ///
    /// let reverse = registry.build("reverse", &Default::default()).unwrap();
    /// assert_eq!(reverse.apply("abc").unwrap(), "cba");
    /// ```
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TransformArgs) -> Result<Transform, TransformError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Register an argument-less transform that cannot fail
    pub fn register_simple<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&str) -> String + Send + Sync + Clone + 'static,
    {
        let transform_name = name.to_string();
        self.register(name, move |_args| {
            let func = func.clone();
            Ok(Transform::new(transform_name.clone(), move |s| Ok(func(s))))
        });
    }

    /// Build a transform by name
    pub fn build(&self, name: &str, args: &TransformArgs) -> Result<Transform, TransformError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TransformError::NotFound(name.to_string()))?;

        factory(args)
    }

    /// Check if a transform is registered
    pub fn has_transform(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Get list of all registered transform names, sorted
    pub fn list_transforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn string_arg(name: &str, args: &TransformArgs, key: &str) -> Result<String, TransformError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| TransformError::InvalidArgs {
            name: name.to_string(),
            message: format!("missing string argument '{}'", key),
        })
}

fn regex_arg(name: &str, args: &TransformArgs) -> Result<regex::Regex, TransformError> {
    let pattern = string_arg(name, args, "pattern")?;
    regex::Regex::new(&pattern).map_err(|e| TransformError::InvalidArgs {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// Parse a date or date-time with a strftime format into Unix seconds
fn parse_date(text: &str, format: &str) -> Result<String, String> {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};

    if let Ok(dt) = DateTime::parse_from_str(text, format) {
        return Ok(dt.timestamp().to_string());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
        return Ok(dt.and_utc().timestamp().to_string());
    }
    match NaiveDate::parse_from_str(text, format) {
        Ok(date) => Ok(date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default()
            .to_string()),
        Err(e) => Err(format!("'{}' does not match '{}': {}", text, format, e)),
    }
}
