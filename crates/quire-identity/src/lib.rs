//! Identity mapping for Quire.
//!
//! Every repository is owned by a DID, but blocks, heads and segments are
//! keyed by a small integer [`ShardId`]. This crate owns that indirection:
//!
//! - [`IdentityMap`] -- cached, race-safe `Did <-> ShardId` lookups
//! - [`IdentityTable`] -- the persisted rows behind the cache
//! - [`InMemoryIdentityTable`] / [`FileIdentityTable`] -- table backends
//!
//! Shard ids are allocated monotonically and never reused, even after an
//! identity is removed.
//!
//! [`ShardId`]: quire_types::ShardId

pub mod error;
pub mod map;
pub mod table;

pub use error::{IdentityError, IdentityResult};
pub use map::IdentityMap;
pub use table::{FileIdentityTable, IdentityRow, IdentityTable, InMemoryIdentityTable, TableSnapshot};
