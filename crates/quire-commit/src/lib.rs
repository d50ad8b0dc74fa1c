//! Commit chains for Quire repositories.
//!
//! Each identity's history is a chain of signed commits. A commit names the
//! tree root it publishes, the previous commit and a monotonically increasing
//! revision; the signature covers the bincode encoding of everything except
//! the signature itself.
//!
//! The current commit of each identity is recorded in a [`HeadStore`]. The
//! only way to move a head is [`HeadStore::compare_and_swap`], which makes the
//! head swap the single publish point of every write.

pub mod chain;
pub mod commit;
pub mod error;
pub mod head;

pub use chain::{verify_extension, verify_links, CommitChain, CommitPage, WriteLease};
pub use commit::{Commit, CommitEntry, UnsignedCommit};
pub use error::{CommitError, CommitResult};
pub use head::{FileHeadStore, Head, HeadStore, InMemoryHeadStore};
