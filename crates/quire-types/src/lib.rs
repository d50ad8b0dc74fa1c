//! Foundation types for Quire.
//!
//! This crate provides the identity, addressing, and structural types shared by
//! every other Quire crate.
//!
//! # Key Types
//!
//! - [`BlockId`] : Content address of an immutable block (BLAKE3 hash)
//! - [`Did`] : Opaque decentralized identity string owning a repository
//! - [`ShardId`] : Small-integer storage key selecting an identity's shard
//! - [`RecordPath`] : `collection/recordKey` pair addressing one record
//! - [`Tid`] : Sortable timestamp identifier used for revisions and record keys
//! - [`OpContext`] : Deadline and cancellation carried by blocking operations

pub mod block;
pub mod context;
pub mod error;
pub mod identity;
pub mod record;
pub mod syntax;
pub mod tid;

pub use block::BlockId;
pub use context::{Interrupted, OpContext};
pub use error::TypeError;
pub use identity::{Did, ShardId};
pub use record::{RecordPath, RecordUri};
pub use tid::Tid;
