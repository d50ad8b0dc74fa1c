use std::path::PathBuf;

use quire_car::CarError;
use quire_commit::CommitError;
use quire_identity::IdentityError;
use quire_lexicon::{LexiconError, ValidationError};
use quire_mst::MstError;
use quire_store::StoreError;
use quire_types::{BlockId, Did, Interrupted, RecordUri, Tid, TypeError};

/// Caller-facing classification of a [`RepoError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    ValidationFailed,
    Corruption,
    SignatureInvalid,
    Internal,
    /// Deadline passed or the operation was cancelled. Nothing was published;
    /// the caller may retry.
    Interrupted,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::ValidationFailed => "validation failed",
            Self::Corruption => "corruption",
            Self::SignatureInvalid => "signature invalid",
            Self::Internal => "internal",
            Self::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("repository not found: {0}")]
    RepoNotFound(Did),

    #[error("repository already exists: {0}")]
    RepoExists(Did),

    #[error("record not found: {0}")]
    RecordNotFound(RecordUri),

    #[error("record already exists: {0}")]
    RecordExists(RecordUri),

    #[error("revision {rev} not found in the chain of {did}")]
    RevisionNotFound { did: Did, rev: Tid },

    #[error("record {uri} is not a valid {declared_type}: {source}")]
    Validation {
        uri: RecordUri,
        declared_type: String,
        #[source]
        source: ValidationError,
    },

    /// The record's declared type names no schema in the catalog.
    #[error("no schema {schema} for record {uri}")]
    SchemaNotFound { uri: RecordUri, schema: String },

    /// The commit survives but compaction dropped the tree it published.
    #[error("tree of commit {commit} in {did} was compacted away")]
    TreeCompacted { did: Did, commit: BlockId },

    #[error("record {uri} is {size} bytes; the limit is {limit}")]
    RecordTooLarge { uri: RecordUri, size: usize, limit: usize },

    #[error("invalid input: {0}")]
    InvalidInput(#[from] TypeError),

    #[error("corrupt archive for {did}: {reason}")]
    CorruptArchive { did: Did, reason: String },

    /// The archive's chain does not contain the current head.
    #[error("archive for {did} does not extend its current head {head}")]
    NotFastForward { did: Did, head: BlockId },

    #[error("cannot read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tree(#[from] MstError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Archive(#[from] CarError),

    #[error(transparent)]
    Lexicon(#[from] LexiconError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RepoNotFound(_)
            | Self::RecordNotFound(_)
            | Self::RevisionNotFound { .. }
            | Self::SchemaNotFound { .. }
            | Self::TreeCompacted { .. } => ErrorKind::NotFound,
            Self::RepoExists(_) | Self::RecordExists(_) | Self::NotFastForward { .. } => ErrorKind::Conflict,
            Self::Validation { .. } | Self::RecordTooLarge { .. } | Self::InvalidInput(_) => {
                ErrorKind::ValidationFailed
            }
            Self::CorruptArchive { .. } => ErrorKind::Corruption,
            Self::ConfigIo { .. } | Self::Config(_) => ErrorKind::Internal,
            Self::Interrupted(_) => ErrorKind::Interrupted,
            Self::Identity(e) if e.is_not_found() => ErrorKind::NotFound,
            Self::Identity(_) => ErrorKind::Internal,
            Self::Store(e) => store_kind(e),
            Self::Tree(e) => tree_kind(e),
            Self::Commit(e) => commit_kind(e),
            Self::Archive(e) if e.is_corruption() => ErrorKind::Corruption,
            Self::Archive(_) => ErrorKind::Internal,
            Self::Lexicon(LexiconError::Validation(_)) => ErrorKind::ValidationFailed,
            Self::Lexicon(e) if e.is_not_found() => ErrorKind::NotFound,
            Self::Lexicon(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call could succeed without other changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Interrupted)
    }
}

fn store_kind(e: &StoreError) -> ErrorKind {
    match e {
        StoreError::NotFound { .. } => ErrorKind::Corruption,
        StoreError::Interrupted(_) => ErrorKind::Interrupted,
        e if e.is_corruption() => ErrorKind::Corruption,
        _ => ErrorKind::Internal,
    }
}

fn tree_kind(e: &MstError) -> ErrorKind {
    match e {
        MstError::KeyNotFound(_) => ErrorKind::NotFound,
        MstError::InvalidKey(_) => ErrorKind::ValidationFailed,
        MstError::Store(e) => store_kind(e),
        e if e.is_corruption() => ErrorKind::Corruption,
        _ => ErrorKind::Internal,
    }
}

fn commit_kind(e: &CommitError) -> ErrorKind {
    match e {
        CommitError::NotFound { .. } | CommitError::NoHead(_) => ErrorKind::NotFound,
        CommitError::SignatureInvalid(_) => ErrorKind::SignatureInvalid,
        CommitError::Interrupted(_) => ErrorKind::Interrupted,
        CommitError::Store(e) => store_kind(e),
        CommitError::Identity(e) if e.is_not_found() => ErrorKind::NotFound,
        e if e.is_conflict() => ErrorKind::Conflict,
        e if e.is_corruption() => ErrorKind::Corruption,
        _ => ErrorKind::Internal,
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use quire_crypto::ContentHasher;
    use quire_types::ShardId;

    fn did() -> Did {
        Did::new("did:plc:alice").unwrap()
    }

    #[test]
    fn kinds_follow_the_underlying_cause() {
        assert_eq!(RepoError::RepoNotFound(did()).kind(), ErrorKind::NotFound);
        assert_eq!(
            RepoError::from(IdentityError::UnknownIdentity(did())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(RepoError::from(CommitError::Busy(did())).kind(), ErrorKind::Conflict);
        assert_eq!(
            RepoError::from(CarError::Truncated).kind(),
            ErrorKind::Corruption
        );
        let id = ContentHasher::BLOCK.hash(b"x");
        assert_eq!(
            RepoError::from(StoreError::NotFound { shard: ShardId::new(1), id }).kind(),
            ErrorKind::Corruption
        );
        assert_eq!(
            RepoError::from(MstError::Store(StoreError::Interrupted(Interrupted::Cancelled))).kind(),
            ErrorKind::Interrupted
        );
        assert_eq!(
            RepoError::from(TypeError::InvalidRecordKey("..".into())).kind(),
            ErrorKind::ValidationFailed
        );
    }

    #[test]
    fn archive_write_overflow_is_internal() {
        assert_eq!(
            RepoError::from(CarError::SectionTooLarge(usize::MAX)).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            RepoError::from(CarError::FrameTooLarge(usize::MAX)).kind(),
            ErrorKind::Corruption
        );
    }

    #[test]
    fn only_conflicts_and_interruptions_retry() {
        assert!(RepoError::from(CommitError::Busy(did())).is_retryable());
        assert!(RepoError::Interrupted(Interrupted::Cancelled).is_retryable());
        assert!(!RepoError::RepoNotFound(did()).is_retryable());
    }
}
