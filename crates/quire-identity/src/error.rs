use quire_types::{Did, ShardId};

/// Errors from identity mapping.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("no shard mapped for identity {0}")]
    UnknownIdentity(Did),

    #[error("no identity mapped to shard {0}")]
    UnknownShard(ShardId),

    #[error("identity {did} is already mapped to shard {existing}")]
    AlreadyMapped { did: Did, existing: ShardId },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IdentityError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownIdentity(_) | Self::UnknownShard(_))
    }
}

/// Result alias for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
