//! Error types for the Scribe mover operator

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Optimistic concurrency conflict (stale resourceVersion)
    #[error("Conflict updating {kind} '{name}': object was modified concurrently")]
    Conflict { kind: &'static str, name: String },

    /// The API server rejected the object as invalid (e.g. an immutable field changed)
    #[error("{kind} '{name}' rejected by the API server: {message}")]
    Invalid {
        kind: &'static str,
        name: String,
        message: String,
    },

    /// Owner reference could not be established
    #[error("Unable to set controller reference: {0}")]
    OwnerReference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller cancelled the reconcile while an API call was in flight
    #[error("Reconcile cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create an owner reference error
    pub fn owner_reference(msg: impl Into<String>) -> Self {
        Error::OwnerReference(msg.into())
    }

    /// Whether the calling control loop should retry the whole reconcile.
    ///
    /// Contract violations and validation failures will not fix themselves
    /// on retry; API and concurrency failures may.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Kube(_) | Error::Conflict { .. } | Error::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        let conflict = Error::Conflict {
            kind: "Job",
            name: "scribe-rsync-a".to_string(),
        };
        assert!(conflict.is_retryable());
        assert!(Error::Cancelled.is_retryable());
    }

    #[test]
    fn contract_errors_are_not_retryable() {
        assert!(!Error::owner_reference("owner has no uid").is_retryable());
        assert!(!Error::validation("no mover").is_retryable());
        assert!(!Error::config("bad budget").is_retryable());
        let invalid = Error::Invalid {
            kind: "Job",
            name: "scribe-rsync-a".to_string(),
            message: "field is immutable".to_string(),
        };
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn invalid_error_names_the_object() {
        let invalid = Error::Invalid {
            kind: "Job",
            name: "scribe-restic-b".to_string(),
            message: "spec.template: field is immutable".to_string(),
        };
        let text = invalid.to_string();
        assert!(text.contains("scribe-restic-b"));
        assert!(text.contains("immutable"));
    }
}
