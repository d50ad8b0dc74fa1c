use quire_store::StoreError;
use quire_types::BlockId;

/// Errors from tree operations.
#[derive(Debug, thiserror::Error)]
pub enum MstError {
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("tree node {0} is missing")]
    MissingNode(BlockId),

    #[error("invalid tree node {id}: {reason}")]
    InvalidNode { id: BlockId, reason: String },

    #[error("invalid tree key {0:?}")]
    InvalidKey(String),

    #[error("node encoding error: {0}")]
    Encoding(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MstError {
    /// Whether the error means the tree's blocks are damaged or incomplete.
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::MissingNode(_) | Self::InvalidNode { .. } => true,
            Self::Store(e) => e.is_corruption(),
            _ => false,
        }
    }
}

/// Result alias for tree operations.
pub type MstResult<T> = Result<T, MstError>;
