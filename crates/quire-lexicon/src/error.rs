use std::path::PathBuf;

use crate::validate::ValidationError;

/// Errors from loading schemas or resolving references.
#[derive(Debug, thiserror::Error)]
pub enum LexiconError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk schema directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid schema {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("schema {path} declares id {declared} but its path gives {derived}")]
    IdMismatch {
        path: PathBuf,
        declared: String,
        derived: String,
    },

    #[error("duplicate schema id {0}")]
    Duplicate(String),

    #[error("malformed reference {0:?}")]
    InvalidReference(String),

    /// The schema id part of a reference names no loaded schema.
    #[error("unresolved reference {reference}: no schema {schema}")]
    UnknownSchema { reference: String, schema: String },

    /// The schema exists but has no such definition.
    #[error("unresolved reference {reference}: schema {schema} has no definition {fragment}")]
    UnknownDefinition {
        reference: String,
        schema: String,
        fragment: String,
    },

    #[error("reference cycle through {0}")]
    Cycle(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl LexiconError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownSchema { .. } | Self::UnknownDefinition { .. }
        )
    }
}

pub type LexiconResult<T> = Result<T, LexiconError>;
