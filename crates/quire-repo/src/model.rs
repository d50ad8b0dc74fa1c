use quire_commit::Head;
use quire_store::ShardStats;
use quire_types::{BlockId, Did, RecordUri, ShardId, Tid};
use serde::{Deserialize, Serialize};

/// Summary of one identity's repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RepoInfo {
    pub did: Did,
    pub shard: ShardId,
    /// `None` until the first commit.
    pub head: Option<Head>,
    pub record_count: usize,
    pub stats: ShardStats,
}

/// A stored record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub uri: RecordUri,
    /// Address of the value block.
    pub cid: BlockId,
    pub value: Vec<u8>,
}

/// One page of [`crate::RepoService::list_records`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordPage {
    pub records: Vec<Record>,
    /// Record key to resume after, when more may remain.
    pub cursor: Option<String>,
}

/// A record write request.
///
/// The declared type defaults to the collection; validation is on unless
/// switched off.
#[derive(Clone, Copy, Debug)]
pub struct WriteRecord<'a> {
    pub collection: &'a str,
    pub rkey: Option<&'a str>,
    pub value: &'a [u8],
    pub declared_type: Option<&'a str>,
    pub validate: bool,
}

impl<'a> WriteRecord<'a> {
    pub fn new(collection: &'a str, value: &'a [u8]) -> Self {
        Self {
            collection,
            rkey: None,
            value,
            declared_type: None,
            validate: true,
        }
    }

    pub fn rkey(mut self, rkey: &'a str) -> Self {
        self.rkey = Some(rkey);
        self
    }

    pub fn declared_type(mut self, declared_type: &'a str) -> Self {
        self.declared_type = Some(declared_type);
        self
    }

    pub fn skip_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub(crate) fn effective_type(&self) -> &'a str {
        self.declared_type.unwrap_or(self.collection)
    }
}

/// Outcome of a record mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteResult {
    pub uri: RecordUri,
    /// Value address; `None` for deletes.
    pub cid: Option<BlockId>,
    pub commit: BlockId,
    pub version: u64,
    pub rev: Tid,
}

/// How much history compaction keeps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactionMode {
    /// Keep the trees of the head and the configured number of prior commits.
    #[default]
    Normal,
    /// Keep only the head's tree.
    Aggressive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub retained_roots: usize,
    pub kept: usize,
    pub removed: usize,
    pub bytes_reclaimed: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// The archive's single root: the head commit or the empty marker.
    pub root: BlockId,
    pub commits: usize,
    pub blocks: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Head after the import; `None` for an empty-marker archive.
    pub head: Option<Head>,
    /// Commits added to the chain.
    pub commits: usize,
    pub blocks: usize,
}
