//! Error types shared across the Podium crates.

use thiserror::Error;

pub type PodiumResult<T> = Result<T, PodiumError>;

/// Top-level error type for the Podium server.
///
/// Authentication failures are deliberately *not* represented here: a bad
/// or expired credential resolves to the anonymous scope instead of an
/// error, so only genuine faults (storage, configuration, invalid input)
/// travel this path.
#[derive(Debug, Error)]
pub enum PodiumError {
    /// The caller's scope does not authorise the requested operation.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// Externally supplied input failed validation.
    #[error("validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// A referenced entity does not exist. Distinct from [`Forbidden`]:
    /// callers must be able to tell 404 from 403.
    ///
    /// [`Forbidden`]: PodiumError::Forbidden
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// A uniqueness constraint was violated.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// The storage collaborator failed. Propagated verbatim; no retries
    /// happen at this layer.
    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PodiumError {
    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Wrap a storage-layer failure, keeping only its message.
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
