use std::collections::HashMap;
use std::sync::Arc;

use quire_types::{BlockId, OpContext, ShardId};
use tracing::debug;

use crate::block::Block;
use crate::error::{StoreError, StoreResult};
use crate::retry::RetryPolicy;
use crate::traits::{BlockSink, BlockSource, BlockStore};

/// Summary of a flushed delta session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Shard generation after the flush.
    pub generation: u64,
    pub blocks: usize,
    pub bytes: u64,
}

/// Write session grouping every block produced for one commit.
///
/// Reads see pending blocks first and fall through to the shard. Nothing
/// reaches the store until [`DeltaSession::flush`], which writes the whole
/// delta as one atomic batch. Dropping the session discards the delta.
pub struct DeltaSession {
    store: Arc<dyn BlockStore>,
    shard: ShardId,
    retry: RetryPolicy,
    pending: Vec<Block>,
    index: HashMap<BlockId, usize>,
}

impl DeltaSession {
    pub fn new(store: Arc<dyn BlockStore>, shard: ShardId, retry: RetryPolicy) -> Self {
        Self {
            store,
            shard,
            retry,
            pending: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Buffer `data` and return its address.
    pub fn put(&mut self, data: Vec<u8>) -> BlockId {
        self.push(Block::new(data))
    }

    /// Buffer a block whose address was computed elsewhere.
    pub fn put_block(&mut self, block: Block) -> StoreResult<BlockId> {
        block.verify()?;
        Ok(self.push(block))
    }

    fn push(&mut self, block: Block) -> BlockId {
        let id = block.id;
        if !self.index.contains_key(&id) {
            self.index.insert(id, self.pending.len());
            self.pending.push(block);
        }
        id
    }

    pub fn get(&self, id: &BlockId) -> StoreResult<Option<Vec<u8>>> {
        if let Some(&pos) = self.index.get(id) {
            return Ok(Some(self.pending[pos].data.clone()));
        }
        let stored = self.retry.run(|| self.store.get(self.shard, id))?;
        Ok(stored.map(|b| b.data))
    }

    /// Read a block, failing with `NotFound` when absent.
    pub fn require(&self, id: &BlockId) -> StoreResult<Vec<u8>> {
        self.get(id)?.ok_or(StoreError::NotFound {
            shard: self.shard,
            id: *id,
        })
    }

    /// Whether the block is pending or already stored.
    pub fn contains(&self, id: &BlockId) -> StoreResult<bool> {
        if self.index.contains_key(id) {
            return Ok(true);
        }
        self.retry.run(|| self.store.has(self.shard, id))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_ids(&self) -> impl Iterator<Item = &BlockId> {
        self.pending.iter().map(|b| &b.id)
    }

    /// Write the delta as one batch.
    ///
    /// The context is checked first; an interrupted flush writes nothing.
    pub fn flush(self, ctx: &OpContext) -> StoreResult<FlushReport> {
        ctx.check()?;
        let bytes = self.pending.iter().map(|b| b.data.len() as u64).sum();
        let generation = self.store.put_batch(self.shard, &self.pending)?;
        debug!(
            shard = %self.shard,
            generation,
            blocks = self.pending.len(),
            bytes,
            "delta session flushed"
        );
        Ok(FlushReport {
            generation,
            blocks: self.pending.len(),
            bytes,
        })
    }

    /// Drop every pending block without writing.
    pub fn discard(self) {
        debug!(shard = %self.shard, blocks = self.pending.len(), "delta session discarded");
    }
}

impl BlockSource for DeltaSession {
    fn read_block(&self, id: &BlockId) -> StoreResult<Option<Vec<u8>>> {
        self.get(id)
    }
}

impl BlockSink for DeltaSession {
    fn write_block(&mut self, data: Vec<u8>) -> BlockId {
        self.put(data)
    }
}

impl std::fmt::Debug for DeltaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaSession")
            .field("shard", &self.shard)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Read-only view of a shard as of the generation at which it was opened.
///
/// Blocks written by later batches are invisible; compaction may still
/// remove blocks out from under a long-lived session.
#[derive(Clone)]
pub struct ReadSession {
    store: Arc<dyn BlockStore>,
    shard: ShardId,
    generation: u64,
    retry: RetryPolicy,
}

impl ReadSession {
    pub fn open(store: Arc<dyn BlockStore>, shard: ShardId, retry: RetryPolicy) -> StoreResult<Self> {
        let generation = retry.run(|| store.generation(shard))?;
        Ok(Self {
            store,
            shard,
            generation,
            retry,
        })
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: &BlockId) -> StoreResult<Option<Vec<u8>>> {
        let stored = self.retry.run(|| self.store.get(self.shard, id))?;
        Ok(stored
            .filter(|b| b.generation <= self.generation)
            .map(|b| b.data))
    }

    pub fn require(&self, id: &BlockId) -> StoreResult<Vec<u8>> {
        self.get(id)?.ok_or(StoreError::NotFound {
            shard: self.shard,
            id: *id,
        })
    }
}

impl BlockSource for ReadSession {
    fn read_block(&self, id: &BlockId) -> StoreResult<Option<Vec<u8>>> {
        self.get(id)
    }
}

impl std::fmt::Debug for ReadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadSession")
            .field("shard", &self.shard)
            .field("generation", &self.generation)
            .finish()
    }
}
