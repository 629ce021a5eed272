use crate::service::{Operation, ServiceError};
use crate::xml::{PathError, XmlError};

/// Fatal loader failure
///
/// Every variant names the action of the mapping that failed, so a failing
/// multi-mapping job can be diagnosed from the message alone.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("invalid mapping for {action}: {message}")]
    InvalidMapping { action: String, message: String },

    #[error("Invalid xpath specified for root path: '{root}' (mapping {action})")]
    RootNotFound { action: String, root: String },

    #[error("invalid path '{path}' in mapping {action}: {source}")]
    Path {
        action: String,
        path: String,
        #[source]
        source: PathError,
    },

    #[error("failed to read delimited source {path}: {source}")]
    Source {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("{operation} failed for {action}: {source}")]
    Service {
        action: String,
        operation: Operation,
        #[source]
        source: ServiceError,
    },

    #[error("Failed to push batch of {count} instances for {action}")]
    PushFailed { action: String, count: usize },
}

impl LoaderError {
    pub(crate) fn invalid(action: &str, message: impl Into<String>) -> Self {
        LoaderError::InvalidMapping {
            action: action.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn service(action: &str, operation: Operation, source: ServiceError) -> Self {
        LoaderError::Service {
            action: action.to_string(),
            operation,
            source,
        }
    }

    /// The remote operation that failed, if this is a remote failure
    pub fn operation(&self) -> Option<Operation> {
        match self {
            LoaderError::Service { operation, .. } => Some(*operation),
            LoaderError::PushFailed { .. } => Some(Operation::BatchCreate),
            _ => None,
        }
    }
}
