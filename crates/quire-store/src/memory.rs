use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use quire_types::{BlockId, ShardId};
use tracing::debug;

use crate::block::{Block, ShardStats, StoredBlock};
use crate::error::StoreResult;
use crate::traits::BlockStore;

#[derive(Default)]
struct Shard {
    blocks: HashMap<BlockId, StoredBlock>,
    generation: u64,
}

/// In-memory, HashMap-based block store.
///
/// Intended for tests and embedding. Each shard has its own `RwLock`, so a
/// batch becomes visible to that shard's readers all at once and writers to
/// different shards never contend. The outer map lock is held only to find
/// or add a shard.
pub struct InMemoryBlockStore {
    shards: RwLock<HashMap<ShardId, Arc<RwLock<Shard>>>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
        }
    }

    /// Number of shards holding at least one block.
    pub fn shard_count(&self) -> usize {
        self.shards
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|s| !s.read().expect("lock poisoned").blocks.is_empty())
            .count()
    }

    fn shard(&self, shard: ShardId) -> Option<Arc<RwLock<Shard>>> {
        self.shards.read().expect("lock poisoned").get(&shard).cloned()
    }

    fn read_shard<T>(&self, shard: ShardId, f: impl FnOnce(&Shard) -> T) -> Option<T> {
        let state = self.shard(shard)?;
        let guard = state.read().expect("lock poisoned");
        Some(f(&guard))
    }

    fn shard_or_insert(&self, shard: ShardId) -> Arc<RwLock<Shard>> {
        if let Some(state) = self.shard(shard) {
            return state;
        }
        let mut shards = self.shards.write().expect("lock poisoned");
        Arc::clone(shards.entry(shard).or_default())
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn get(&self, shard: ShardId, id: &BlockId) -> StoreResult<Option<StoredBlock>> {
        Ok(self.read_shard(shard, |s| s.blocks.get(id).cloned()).flatten())
    }

    fn has(&self, shard: ShardId, id: &BlockId) -> StoreResult<bool> {
        Ok(self
            .read_shard(shard, |s| s.blocks.contains_key(id))
            .unwrap_or(false))
    }

    fn put_batch(&self, shard: ShardId, blocks: &[Block]) -> StoreResult<u64> {
        for block in blocks {
            block.verify()?;
        }
        let state = self.shard_or_insert(shard);
        let mut state = state.write().expect("lock poisoned");
        let fresh: Vec<&Block> = blocks
            .iter()
            .filter(|b| !state.blocks.contains_key(&b.id))
            .collect();
        if fresh.is_empty() {
            return Ok(state.generation);
        }
        state.generation += 1;
        let generation = state.generation;
        for block in &fresh {
            state.blocks.insert(
                block.id,
                StoredBlock {
                    data: block.data.clone(),
                    generation,
                },
            );
        }
        debug!(%shard, generation, written = fresh.len(), "batch stored");
        Ok(generation)
    }

    fn remove_batch(&self, shard: ShardId, ids: &[BlockId]) -> StoreResult<usize> {
        let Some(state) = self.shard(shard) else {
            return Ok(0);
        };
        let mut state = state.write().expect("lock poisoned");
        Ok(ids
            .iter()
            .filter(|id| state.blocks.remove(*id).is_some())
            .count())
    }

    fn list(&self, shard: ShardId) -> StoreResult<Vec<BlockId>> {
        let mut ids: Vec<BlockId> = self
            .read_shard(shard, |s| s.blocks.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    fn wipe(&self, shard: ShardId) -> StoreResult<()> {
        let removed = self.shards.write().expect("lock poisoned").remove(&shard);
        if let Some(state) = removed {
            // Let an in-flight batch on the detached shard finish first.
            let _settled = state.write().expect("lock poisoned");
        }
        Ok(())
    }

    fn shard_stats(&self, shard: ShardId) -> StoreResult<ShardStats> {
        Ok(self
            .read_shard(shard, |s| ShardStats {
                blocks: s.blocks.len(),
                bytes: s.blocks.values().map(|b| b.data.len() as u64).sum(),
                generation: s.generation,
            })
            .unwrap_or_default())
    }

    fn generation(&self, shard: ShardId) -> StoreResult<u64> {
        Ok(self.read_shard(shard, |s| s.generation).unwrap_or(0))
    }
}

impl std::fmt::Debug for InMemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlockStore")
            .field("shard_count", &self.shard_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const ALICE: ShardId = ShardId::new(1);
    const BOB: ShardId = ShardId::new(2);

    fn block(content: &str) -> Block {
        Block::new(content.as_bytes().to_vec())
    }

    // -----------------------------------------------------------------------
    // Core reads and writes
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get() {
        let store = InMemoryBlockStore::new();
        let b = block("hello");
        let generation = store.put_batch(ALICE, &[b.clone()]).unwrap();
        assert_eq!(generation, 1);

        let stored = store.get(ALICE, &b.id).unwrap().expect("should exist");
        assert_eq!(stored.data, b.data);
        assert_eq!(stored.generation, 1);
        assert!(store.has(ALICE, &b.id).unwrap());
    }

    #[test]
    fn shards_are_isolated() {
        let store = InMemoryBlockStore::new();
        let b = block("private");
        store.put_batch(ALICE, &[b.clone()]).unwrap();
        assert!(store.get(BOB, &b.id).unwrap().is_none());
        assert!(store.list(BOB).unwrap().is_empty());
    }

    #[test]
    fn duplicate_content_is_deduplicated() {
        let store = InMemoryBlockStore::new();
        store.put_batch(ALICE, &[block("same"), block("same")]).unwrap();
        assert_eq!(store.shard_stats(ALICE).unwrap().blocks, 1);

        // Rewriting existing content does not advance the generation.
        let generation = store.put_batch(ALICE, &[block("same")]).unwrap();
        assert_eq!(generation, 1);
        assert_eq!(store.get(ALICE, &block("same").id).unwrap().unwrap().generation, 1);
    }

    #[test]
    fn bad_address_rejects_whole_batch() {
        let store = InMemoryBlockStore::new();
        let good = block("good");
        let bad = Block {
            id: block("claimed").id,
            data: b"actual".to_vec(),
        };
        let err = store.put_batch(ALICE, &[good.clone(), bad]).unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
        assert!(!store.has(ALICE, &good.id).unwrap());
    }

    // -----------------------------------------------------------------------
    // Removal, retention and wipe
    // -----------------------------------------------------------------------

    #[test]
    fn retain_keeps_only_requested() {
        let store = InMemoryBlockStore::new();
        let (a, b, c) = (block("a"), block("bb"), block("ccc"));
        store.put_batch(ALICE, &[a.clone(), b.clone(), c.clone()]).unwrap();

        let keep: HashSet<BlockId> = [a.id].into_iter().collect();
        let report = store.retain(ALICE, &keep).unwrap();
        assert_eq!(report.kept, 1);
        assert_eq!(report.removed, 2);
        assert_eq!(report.bytes_reclaimed, 5);
        assert_eq!(store.list(ALICE).unwrap(), vec![a.id]);
    }

    #[test]
    fn wipe_drops_shard() {
        let store = InMemoryBlockStore::new();
        store.put_batch(ALICE, &[block("x")]).unwrap();
        store.put_batch(BOB, &[block("y")]).unwrap();
        store.wipe(ALICE).unwrap();
        assert_eq!(store.shard_stats(ALICE).unwrap(), ShardStats::default());
        assert_eq!(store.shard_stats(BOB).unwrap().blocks, 1);
    }

    #[test]
    fn remove_counts_present_only() {
        let store = InMemoryBlockStore::new();
        let a = block("a");
        store.put_batch(ALICE, &[a.clone()]).unwrap();
        assert_eq!(store.remove_batch(ALICE, &[a.id, block("z").id]).unwrap(), 1);
        assert_eq!(store.remove_batch(BOB, &[a.id]).unwrap(), 0);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_batches_on_distinct_shards() {
        let store = Arc::new(InMemoryBlockStore::new());
        let handles: Vec<_> = (1..=8u64)
            .map(|n| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let shard = ShardId::new(n);
                    for i in 0..10 {
                        store.put_batch(shard, &[block(&format!("{n}-{i}"))]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for n in 1..=8u64 {
            let stats = store.shard_stats(ShardId::new(n)).unwrap();
            assert_eq!(stats.blocks, 10);
            assert_eq!(stats.generation, 10);
        }
    }

    #[test]
    fn a_busy_shard_does_not_block_others() {
        let store = InMemoryBlockStore::new();
        let b = block("bob's");
        store.put_batch(BOB, &[b.clone()]).unwrap();
        let alice = store.shard_or_insert(ALICE);
        let store = &store;

        thread::scope(|s| {
            // As if a batch for Alice were mid-insert.
            let busy = alice.write().unwrap();
            let (tx, rx) = mpsc::channel();
            s.spawn(move || {
                let read = store.get(BOB, &b.id).unwrap().is_some();
                let generation = store.put_batch(BOB, &[block("more")]).unwrap();
                tx.send((read, generation)).unwrap();
            });
            assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), (true, 2));
            drop(busy);
        });
        assert_eq!(store.shard_stats(ALICE).unwrap().blocks, 0);
    }
}
