//! Typed values carried by instances.
//!
//! Every value position in an instance is tagged with a [`DataType`]. Loaders
//! produce values from raw source text through [`Value::parse`], which applies
//! the coercion rules of each data type.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data type tag of a value position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Void,
    Integer,
    String,
    Boolean,
    Decimal,
    Timestamp,
    Uri,
    Float,
    UnsignedInteger,
    Binary,
    Uuid,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Void => "VOID",
            DataType::Integer => "INTEGER",
            DataType::String => "STRING",
            DataType::Boolean => "BOOLEAN",
            DataType::Decimal => "DECIMAL",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Uri => "URI",
            DataType::Float => "FLOAT",
            DataType::UnsignedInteger => "UNSIGNED_INTEGER",
            DataType::Binary => "BINARY",
            DataType::Uuid => "UUID",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error raised when source text cannot be coerced into a data type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Value Error: {value} not of type: {expected}")]
pub struct ValueError {
    pub value: String,
    pub expected: DataType,
}

impl ValueError {
    fn new(value: &str, expected: DataType) -> Self {
        Self {
            value: value.to_string(),
            expected,
        }
    }
}

/// Fixed-point decimal: `coefficient * 10^exponent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decimal {
    pub coefficient: i64,
    pub exponent: i32,
}

impl Decimal {
    pub fn new(coefficient: i64, exponent: i32) -> Self {
        Self {
            coefficient,
            exponent,
        }
    }
}

impl FromStr for Decimal {
    type Err = ValueError;

    /// Accepts plain decimal notation (`-12.50`) or explicit
    /// coefficient/exponent notation (`1250E-2`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ValueError::new(s, DataType::Decimal);
        let text = s.trim();

        if let Some((coefficient, exponent)) = text.split_once(['E', 'e']) {
            let coefficient = coefficient.parse::<i64>().map_err(|_| err())?;
            let exponent = exponent.parse::<i32>().map_err(|_| err())?;
            return Ok(Decimal::new(coefficient, exponent));
        }

        let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(err());
        }
        if !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }

        let digits = format!("{}{}", whole, fraction);
        let coefficient = digits.parse::<i64>().map_err(|_| err())?;
        let exponent = -i32::try_from(fraction.len()).map_err(|_| err())?;
        Ok(Decimal::new(coefficient, exponent))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}E{}", self.coefficient, self.exponent)
    }
}

/// Point in time with the timezone information it was recorded in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub unix_seconds: i64,
    pub timezone: String,
    /// Offset from UTC in seconds
    pub offset: i32,
}

impl FromStr for Timestamp {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if let Ok(unix_seconds) = text.parse::<i64>() {
            return Ok(Timestamp {
                unix_seconds,
                timezone: String::new(),
                offset: 0,
            });
        }

        let parsed = DateTime::parse_from_rfc3339(text)
            .map_err(|_| ValueError::new(s, DataType::Timestamp))?;
        Ok(Timestamp {
            unix_seconds: parsed.timestamp(),
            timezone: String::new(),
            offset: parsed.offset().local_minus_utc(),
        })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unix_seconds)?;
        if self.offset < 0 {
            write!(f, " {}", self.offset)?;
        } else if self.offset > 0 {
            write!(f, " +{}", self.offset)?;
        }
        if !self.timezone.is_empty() {
            write!(f, " {}", self.timezone)?;
        }
        Ok(())
    }
}

/// URI split into its components
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Uri {
    pub schema: String,
    pub user_name: String,
    pub user_password: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: String,
    pub fragment: String,
}

impl FromStr for Uri {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = url::Url::parse(s.trim()).map_err(|_| ValueError::new(s, DataType::Uri))?;
        Ok(Uri {
            schema: parsed.scheme().to_string(),
            user_name: parsed.username().to_string(),
            user_password: parsed.password().unwrap_or_default().to_string(),
            host: parsed.host_str().unwrap_or_default().to_string(),
            port: parsed.port().unwrap_or(0),
            path: parsed.path().to_string(),
            query: parsed.query().map(|q| format!("?{}", q)).unwrap_or_default(),
            fragment: parsed
                .fragment()
                .map(|frag| format!("#{}", frag))
                .unwrap_or_default(),
        })
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.schema)?;
        if !self.user_name.is_empty() && !self.user_password.is_empty() {
            write!(f, "{}:{}@", self.user_name, self.user_password)?;
        }
        write!(f, "{}", self.host)?;
        if self.port != 0 {
            write!(f, ":{}", self.port)?;
        }
        if self.path.starts_with('/') {
            write!(f, "{}", self.path)?;
        } else {
            write!(f, "/{}", self.path)?;
        }
        write!(f, "{}{}", self.query, self.fragment)
    }
}

/// A value tagged with its data type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "data_type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Void,
    Integer(i64),
    String(String),
    Boolean(bool),
    Decimal(Decimal),
    Timestamp(Timestamp),
    Uri(Uri),
    Float(f64),
    UnsignedInteger(u64),
    Binary(Vec<u8>),
    Uuid(uuid::Uuid),
}

impl Value {
    /// Coerce raw source text into a value of the given data type.
    ///
    /// # Example
    ///
    /// ```
    /// use dynaload::types::{DataType, Value};
    ///
    /// assert_eq!(Value::parse(DataType::Integer, "42").unwrap(), Value::Integer(42));
    /// assert_eq!(Value::parse(DataType::Boolean, "TRUE").unwrap(), Value::Boolean(true));
    /// assert!(Value::parse(DataType::Integer, "forty-two").is_err());
    /// ```
    pub fn parse(data_type: DataType, text: &str) -> Result<Value, ValueError> {
        let err = || ValueError::new(text, data_type);
        match data_type {
            DataType::Void => Ok(Value::Void),
            DataType::Integer => text.trim().parse().map(Value::Integer).map_err(|_| err()),
            DataType::String => Ok(Value::String(text.to_string())),
            DataType::Boolean => Ok(Value::Boolean(text.trim().to_lowercase() == "true")),
            DataType::Decimal => text.parse().map(Value::Decimal),
            DataType::Timestamp => text.parse().map(Value::Timestamp),
            DataType::Uri => text.parse().map(Value::Uri),
            DataType::Float => text.trim().parse().map(Value::Float).map_err(|_| err()),
            DataType::UnsignedInteger => text
                .trim()
                .parse()
                .map(Value::UnsignedInteger)
                .map_err(|_| err()),
            DataType::Binary => Ok(Value::Binary(text.as_bytes().to_vec())),
            DataType::Uuid => uuid::Uuid::parse_str(text.trim())
                .map(Value::Uuid)
                .map_err(|_| err()),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Void => DataType::Void,
            Value::Integer(_) => DataType::Integer,
            Value::String(_) => DataType::String,
            Value::Boolean(_) => DataType::Boolean,
            Value::Decimal(_) => DataType::Decimal,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Uri(_) => DataType::Uri,
            Value::Float(_) => DataType::Float,
            Value::UnsignedInteger(_) => DataType::UnsignedInteger,
            Value::Binary(_) => DataType::Binary,
            Value::Uuid(_) => DataType::Uuid,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "None"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::Uri(uri) => write!(f, "{}", uri),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::UnsignedInteger(u) => write!(f, "{}", u),
            Value::Binary(bytes) => write!(f, "{:?}", bytes),
            Value::Uuid(id) => write!(f, "{}", id),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}
