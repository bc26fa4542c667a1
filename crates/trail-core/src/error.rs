//! Error types shared by every component of the audit core

use thiserror::Error;

/// Audit error type
///
/// Sink and action failures are carried through unchanged so callers can
/// tell which stage failed.
#[derive(Error, Debug)]
pub enum AuditError {
    /// A wrapper could not resolve a provider, or the configuration is
    /// otherwise unusable for the requested operation.
    #[error("Audit configuration error: {0}")]
    Configuration(String),

    /// The provider cannot perform this operation at all (append-only
    /// sinks, write-only sinks).
    #[error("Operation '{operation}' is not supported by {provider}")]
    NotSupported {
        provider: String,
        operation: &'static str,
    },

    /// The cancellation token fired before the provider was invoked.
    #[error("Audit operation cancelled")]
    Cancelled,

    /// The custom fields object did not flatten into a name/value map.
    #[error("Invalid custom fields: {0}")]
    InvalidCustomFields(String),

    /// Error raised by a concrete sink.
    #[error("Data provider error: {0}")]
    Sink(#[source] anyhow::Error),

    /// Error raised by a custom action.
    #[error("Custom action error: {0}")]
    Action(#[source] anyhow::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AuditError {
    /// Build a `NotSupported` error for the given provider and operation
    pub fn not_supported(provider: impl Into<String>, operation: &'static str) -> Self {
        AuditError::NotSupported {
            provider: provider.into(),
            operation,
        }
    }

    /// Wrap an arbitrary sink failure
    pub fn sink(err: impl Into<anyhow::Error>) -> Self {
        AuditError::Sink(err.into())
    }

    /// Wrap an arbitrary custom action failure
    pub fn action(err: impl Into<anyhow::Error>) -> Self {
        AuditError::Action(err.into())
    }

    /// Whether this error means "capability missing" rather than a failure
    pub fn is_not_supported(&self) -> bool {
        matches!(self, AuditError::NotSupported { .. })
    }
}

pub type AuditResult<T> = Result<T, AuditError>;
