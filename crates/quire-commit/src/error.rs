use quire_crypto::{ChainError, SignError, SignatureError};
use quire_identity::IdentityError;
use quire_store::StoreError;
use quire_types::{BlockId, Did, Interrupted};

/// Errors from commit chain operations.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// The head moved since the writer observed it.
    #[error("head of {did} is {actual:?}, expected {expected:?}")]
    Conflict {
        did: Did,
        expected: Option<BlockId>,
        actual: Option<BlockId>,
    },

    /// Another write for the identity is in flight.
    #[error("a write for {0} is already in progress")]
    Busy(Did),

    #[error("commit {id} not found for {did}")]
    NotFound { did: Did, id: BlockId },

    #[error("{0} has no commits")]
    NoHead(Did),

    #[error("undecodable commit {id}: {reason}")]
    Decode { id: BlockId, reason: String },

    #[error("commit encoding error: {0}")]
    Encoding(String),

    #[error("commit signature invalid: {0}")]
    SignatureInvalid(#[from] SignatureError),

    /// The signer could not produce a signature.
    #[error("signing failed: {0}")]
    Sign(#[from] SignError),

    #[error("broken commit chain for {did}: {source}")]
    Chain {
        did: Did,
        #[source]
        source: ChainError,
    },

    #[error("commit chain for {did} is inconsistent at version {version}: {reason}")]
    Inconsistent {
        did: Did,
        version: u64,
        reason: String,
    },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("head store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl CommitError {
    /// Whether the caller may retry after re-reading the head.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Busy(_))
    }

    pub fn is_corruption(&self) -> bool {
        match self {
            Self::Decode { .. } | Self::Chain { .. } | Self::Inconsistent { .. } => true,
            Self::Store(e) => e.is_corruption(),
            _ => false,
        }
    }
}

/// Result alias for commit operations.
pub type CommitResult<T> = Result<T, CommitError>;
