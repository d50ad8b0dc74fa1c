//! Content-addressed block storage for Quire.
//!
//! Every repository artifact (record values, tree nodes, commits) is stored
//! as an immutable block identified by its domain-separated BLAKE3 address.
//! Blocks are grouped in shards, one per identity, selected by [`ShardId`].
//!
//! # Storage Backends
//!
//! All backends implement the [`BlockStore`] trait:
//!
//! - [`InMemoryBlockStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileBlockStore`] -- one append-only, CRC-framed segment file per shard
//!
//! # Sessions
//!
//! - [`DeltaSession`] -- buffers every block written for one commit and
//!   flushes them as a single atomic batch
//! - [`ReadSession`] -- observes the shard as of the generation at which it
//!   was opened
//!
//! # Design Rules
//!
//! 1. Blocks are write-once; identical content deduplicates to one block.
//! 2. A batch is all-or-nothing, both in memory and on disk.
//! 3. The store never interprets block contents.
//! 4. Only compaction removes blocks, and reachability is the caller's job.
//! 5. All I/O errors are propagated, never silently ignored.
//!
//! [`ShardId`]: quire_types::ShardId

pub mod block;
pub mod error;
pub mod file;
pub mod framing;
pub mod memory;
pub mod retry;
pub mod session;
pub mod traits;

pub use block::{Block, RetainReport, ShardStats, StoredBlock};
pub use error::{StoreError, StoreResult};
pub use file::FileBlockStore;
pub use memory::InMemoryBlockStore;
pub use retry::RetryPolicy;
pub use session::{DeltaSession, FlushReport, ReadSession};
pub use traits::{BlockSink, BlockSource, BlockStore};
