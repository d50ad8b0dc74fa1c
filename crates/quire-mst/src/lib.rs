//! Merkle Search Tree for Quire repositories.
//!
//! The tree maps string keys (`collection/recordKey`) to block addresses.
//! Its shape is a pure function of the key set: each key's layer is derived
//! from the leading zero bits of its hash, so two trees holding the same
//! entries always have the same root address regardless of insertion order.
//!
//! Nodes are immutable blocks. Every mutation writes the changed path into a
//! [`BlockSink`](quire_store::BlockSink) and returns the new root; the old
//! root stays valid.

pub mod diff;
pub mod error;
pub mod node;
pub mod tree;

pub use diff::{diff, TreeDiff};
pub use error::{MstError, MstResult};
pub use node::{layer_for_key, Entry, NodeData, MAX_KEY_LEN};
pub use tree::{Mst, Page};
