use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("identity must be a non-empty string")]
    EmptyDid,

    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),

    #[error("invalid record key: {0:?}")]
    InvalidRecordKey(String),

    #[error("invalid record path {0:?}: expected collection/recordKey")]
    InvalidRecordPath(String),

    #[error("invalid timestamp identifier: {0:?}")]
    InvalidTid(String),
}
