use std::io;

use quire_types::{BlockId, Interrupted, ShardId};

/// Errors from block store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A block required by the caller is absent.
    #[error("block {id} not found in shard {shard}")]
    NotFound { shard: ShardId, id: BlockId },

    /// Stored or supplied bytes do not hash to their address.
    #[error("hash mismatch for block {id}: bytes hash to {computed}")]
    HashMismatch { id: BlockId, computed: BlockId },

    /// A segment or log file is structurally damaged.
    #[error("corrupt segment for shard {shard}: {reason}")]
    CorruptSegment { shard: ShardId, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl StoreError {
    /// Whether retrying the same read could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Whether the error indicates damaged data rather than a missing block.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::HashMismatch { .. } | Self::CorruptSegment { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
