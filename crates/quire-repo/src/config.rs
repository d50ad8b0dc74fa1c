use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quire_car::MAX_BLOCK_LEN;
use quire_lexicon::ValidateFlags;
use quire_store::RetryPolicy;
use quire_types::OpContext;
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};

/// Service configuration, usually read from a TOML file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Root for block segments, the identity log and head files.
    pub data_dir: PathBuf,
    /// Schema tree loaded at startup. Without one the catalog starts empty.
    pub lexicon_dir: Option<PathBuf>,
    /// Deadline applied to contexts from [`RepoConfig::context`].
    pub op_timeout_ms: Option<u64>,
    pub validation: ValidationConfig,
    pub compaction: CompactionConfig,
    /// Largest record value accepted on write. Values above the archive
    /// block limit are clamped to it.
    pub max_record_bytes: usize,
    /// Retry policy for idempotent reads.
    pub retry: RetryPolicy,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            lexicon_dir: None,
            op_timeout_ms: Some(30_000),
            validation: ValidationConfig::default(),
            compaction: CompactionConfig::default(),
            max_record_bytes: MAX_BLOCK_LEN,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub closed_world: bool,
    pub lenient_datetime: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            closed_world: false,
            lenient_datetime: true,
        }
    }
}

impl ValidationConfig {
    pub fn flags(&self) -> ValidateFlags {
        ValidateFlags {
            closed_world: self.closed_world,
            lenient_datetime: self.lenient_datetime,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Commits before the head whose trees survive normal compaction.
    pub retained_prior_heads: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            retained_prior_heads: 2,
        }
    }
}

impl RepoConfig {
    pub fn from_toml_str(text: &str) -> RepoResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| RepoError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn op_timeout(&self) -> Option<Duration> {
        self.op_timeout_ms.map(Duration::from_millis)
    }

    /// The effective record size limit.
    pub fn record_limit(&self) -> usize {
        self.max_record_bytes.min(MAX_BLOCK_LEN)
    }

    /// A fresh context carrying the configured deadline.
    pub fn context(&self) -> OpContext {
        match self.op_timeout() {
            Some(timeout) => OpContext::with_timeout(timeout),
            None => OpContext::background(),
        }
    }

    pub(crate) fn blocks_dir(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }

    pub(crate) fn identity_log(&self) -> PathBuf {
        self.data_dir.join("identities.log")
    }

    pub(crate) fn heads_dir(&self) -> PathBuf {
        self.data_dir.join("heads")
    }
}
