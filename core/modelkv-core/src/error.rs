//! Error types for the modelkv engine.
//!
//! All public APIs return `MkvResult<T>`: no panics in library code.

use thiserror::Error;

/// Unified error type for all modelkv operations.
#[derive(Debug, Error)]
pub enum MkvError {
    /// A model property declares a `type` the mapping layer does not know
    #[error("unknown property type '{type_name}' for {model}.{property}")]
    UnknownPropertyType {
        model: String,
        property: String,
        type_name: String,
    },

    /// Structurally invalid model definition
    #[error("invalid model '{model}': {message}")]
    InvalidModel { model: String, message: String },

    /// Model id is not present in the registry
    #[error("model '{0}' not found")]
    UnknownModel(String),

    /// Invalid engine configuration
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Requested row or overflow object does not exist
    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    /// Conditional create hit an existing row
    #[error("resource '{0}' already exists")]
    ResourceExists(String),

    /// Backend signal: the physical table is already provisioned
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    /// Physical table could not be created (retryable by a later caller)
    #[error("failed to create table '{table}': {reason}")]
    TableCreation { table: String, reason: String },

    /// Resource is missing a field the storage layer depends on
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// Filter document is not shaped `{ OP: { property: value } }`
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Generic failure from the physical store or overflow store
    #[error("backend error: {0}")]
    Backend(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// sled embedded database error
    #[error("sled error: {source}")]
    Sled {
        #[from]
        source: sled::Error,
    },

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl MkvError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        MkvError::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MkvError::NotFound { .. })
    }

    /// Configuration errors are fatal and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MkvError::UnknownPropertyType { .. }
                | MkvError::InvalidModel { .. }
                | MkvError::UnknownModel(_)
                | MkvError::InvalidConfig(_)
        )
    }

    /// Whether an outer layer may reasonably retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MkvError::TableCreation { .. }
                | MkvError::Backend(_)
                | MkvError::Sled { .. }
                | MkvError::Io { .. }
        )
    }
}

/// Result type alias for all modelkv operations.
pub type MkvResult<T> = Result<T, MkvError>;

impl From<serde_json::Error> for MkvError {
    fn from(err: serde_json::Error) -> Self {
        MkvError::Serialization(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<MkvError>> for MkvError {
    fn from(err: sled::transaction::TransactionError<MkvError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(source) => MkvError::Sled { source },
        }
    }
}

impl From<tokio::task::JoinError> for MkvError {
    fn from(err: tokio::task::JoinError) -> Self {
        MkvError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unknown_property_type() {
        let err = MkvError::UnknownPropertyType {
            model: "tradle.Widget".to_string(),
            property: "size".to_string(),
            type_name: "decimal".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unknown property type 'decimal' for tradle.Widget.size"
        );
        assert!(err.is_configuration());
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_display_not_found() {
        let err = MkvError::not_found("row", "L1");
        assert_eq!(err.to_string(), "row 'L1' not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn error_table_creation_is_retryable() {
        let err = MkvError::TableCreation {
            table: "tradle_Widget".to_string(),
            reason: "throttled".to_string(),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("tradle_Widget"));
    }

    #[test]
    fn error_from_serde_json() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: MkvError = parse.unwrap_err().into();
        assert!(matches!(err, MkvError::Serialization(_)));
    }

    #[test]
    fn error_from_aborted_transaction_keeps_cause() {
        let aborted = sled::transaction::TransactionError::Abort(MkvError::ResourceExists(
            "L1".to_string(),
        ));
        let err: MkvError = aborted.into();
        assert!(matches!(err, MkvError::ResourceExists(ref key) if key == "L1"));
    }
}
