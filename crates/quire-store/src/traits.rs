use std::collections::{HashMap, HashSet};

use quire_types::{BlockId, ShardId};

use crate::block::{Block, RetainReport, ShardStats, StoredBlock};
use crate::error::StoreResult;

/// Content-addressed block store partitioned into per-identity shards.
///
/// All implementations must satisfy these invariants:
/// - Blocks are immutable once written; re-writing an address is a no-op.
/// - `put_batch` is atomic: after a crash either every block of the batch is
///   visible or none is.
/// - Each batch that adds at least one block advances the shard generation by
///   one and stamps the new blocks with it.
/// - Concurrent reads are always safe.
pub trait BlockStore: Send + Sync {
    /// Read a block. Returns `Ok(None)` if the shard does not hold it.
    fn get(&self, shard: ShardId, id: &BlockId) -> StoreResult<Option<StoredBlock>>;

    fn has(&self, shard: ShardId, id: &BlockId) -> StoreResult<bool>;

    /// Write a batch of blocks and return the shard generation afterwards.
    ///
    /// Every block is verified against its address before anything is
    /// written.
    fn put_batch(&self, shard: ShardId, blocks: &[Block]) -> StoreResult<u64>;

    /// Remove blocks. Returns how many were present.
    ///
    /// Intended for compaction only; removing a reachable block corrupts the
    /// repository.
    fn remove_batch(&self, shard: ShardId, ids: &[BlockId]) -> StoreResult<usize>;

    /// Every block address in the shard, sorted.
    fn list(&self, shard: ShardId) -> StoreResult<Vec<BlockId>>;

    /// Drop the whole shard.
    fn wipe(&self, shard: ShardId) -> StoreResult<()>;

    fn shard_stats(&self, shard: ShardId) -> StoreResult<ShardStats>;

    /// Generation of the most recent batch written to the shard.
    fn generation(&self, shard: ShardId) -> StoreResult<u64>;

    /// Remove every block not in `keep`.
    fn retain(&self, shard: ShardId, keep: &HashSet<BlockId>) -> StoreResult<RetainReport> {
        let mut report = RetainReport::default();
        let mut doomed = Vec::new();
        for id in self.list(shard)? {
            if keep.contains(&id) {
                report.kept += 1;
            } else if let Some(block) = self.get(shard, &id)? {
                report.bytes_reclaimed += block.data.len() as u64;
                doomed.push(id);
            }
        }
        report.removed = self.remove_batch(shard, &doomed)?;
        Ok(report)
    }
}

/// Read access to blocks, used by tree and chain walkers.
pub trait BlockSource {
    fn read_block(&self, id: &BlockId) -> StoreResult<Option<Vec<u8>>>;
}

/// Buffered write access to blocks.
pub trait BlockSink: BlockSource {
    /// Buffer `data` and return its address.
    fn write_block(&mut self, data: Vec<u8>) -> BlockId;
}

impl BlockSource for HashMap<BlockId, Vec<u8>> {
    fn read_block(&self, id: &BlockId) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.get(id).cloned())
    }
}

impl BlockSink for HashMap<BlockId, Vec<u8>> {
    fn write_block(&mut self, data: Vec<u8>) -> BlockId {
        let block = Block::new(data);
        self.entry(block.id).or_insert(block.data);
        block.id
    }
}

impl<S: BlockSource + ?Sized> BlockSource for &S {
    fn read_block(&self, id: &BlockId) -> StoreResult<Option<Vec<u8>>> {
        (**self).read_block(id)
    }
}

impl<S: BlockSource + ?Sized> BlockSource for &mut S {
    fn read_block(&self, id: &BlockId) -> StoreResult<Option<Vec<u8>>> {
        (**self).read_block(id)
    }
}

impl<S: BlockSink + ?Sized> BlockSink for &mut S {
    fn write_block(&mut self, data: Vec<u8>) -> BlockId {
        (**self).write_block(data)
    }
}
