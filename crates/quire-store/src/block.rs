use quire_crypto::ContentHasher;
use quire_types::BlockId;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// An immutable, content-addressed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub data: Vec<u8>,
}

impl Block {
    /// Address `data` with the block hasher.
    pub fn new(data: Vec<u8>) -> Self {
        let id = ContentHasher::BLOCK.hash(&data);
        Self { id, data }
    }

    /// Pair bytes with a claimed address, failing if they disagree.
    pub fn verified(id: BlockId, data: Vec<u8>) -> StoreResult<Self> {
        let block = Self { id, data };
        block.verify()?;
        Ok(block)
    }

    pub fn verify(&self) -> StoreResult<()> {
        let computed = ContentHasher::BLOCK.hash(&self.data);
        if computed == self.id {
            Ok(())
        } else {
            Err(StoreError::HashMismatch {
                id: self.id,
                computed,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A block as held by a store, stamped with the shard generation of the
/// batch that first wrote it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlock {
    pub data: Vec<u8>,
    pub generation: u64,
}

/// Size summary of one shard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStats {
    pub blocks: usize,
    pub bytes: u64,
    pub generation: u64,
}

/// Outcome of a compaction pass over one shard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainReport {
    pub kept: usize,
    pub removed: usize,
    pub bytes_reclaimed: u64,
}
