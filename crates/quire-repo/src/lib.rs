//! Repository facade: per-identity record repositories over the block
//! store, tree, commit chain, archive codec and lexicon catalog.
//!
//! [`RepoService`] is the single entry point. Reads see the head that was
//! current when they started; writes are serialized per identity and become
//! visible only when the head pointer moves.

mod compact;
mod config;
mod error;
mod exchange;
mod model;
mod service;

pub use config::{CompactionConfig, RepoConfig, ValidationConfig};
pub use error::{ErrorKind, RepoError, RepoResult};
pub use model::{
    CompactionMode, CompactionReport, ExportSummary, ImportSummary, Record, RecordPage, RepoInfo, WriteRecord,
    WriteResult,
};
pub use service::RepoService;
