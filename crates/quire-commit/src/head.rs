use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use quire_types::{BlockId, Did, Tid};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{CommitError, CommitResult};

/// Pointer to the newest commit of one identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    pub commit: BlockId,
    /// Tree root published by the commit.
    pub data: BlockId,
    pub version: u64,
    pub rev: Tid,
}

/// Storage for head pointers.
///
/// Heads only move through [`HeadStore::compare_and_swap`]: the swap
/// succeeds when the stored commit matches `expected` (`None` meaning no
/// head) and otherwise fails with `Conflict` carrying the actual value.
pub trait HeadStore: Send + Sync {
    fn get(&self, did: &Did) -> CommitResult<Option<Head>>;

    /// Replace the head, or remove it when `new` is `None`.
    fn compare_and_swap(
        &self,
        did: &Did,
        expected: Option<BlockId>,
        new: Option<Head>,
    ) -> CommitResult<()>;

    /// Every identity with a head, sorted by DID.
    fn list(&self) -> CommitResult<Vec<(Did, Head)>>;
}

fn conflict(did: &Did, expected: Option<BlockId>, actual: Option<&Head>) -> CommitError {
    CommitError::Conflict {
        did: did.clone(),
        expected,
        actual: actual.map(|h| h.commit),
    }
}

/// `HashMap`-backed head store.
#[derive(Debug, Default)]
pub struct InMemoryHeadStore {
    heads: RwLock<HashMap<Did, Head>>,
}

impl InMemoryHeadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HeadStore for InMemoryHeadStore {
    fn get(&self, did: &Did) -> CommitResult<Option<Head>> {
        Ok(self.heads.read().expect("lock poisoned").get(did).cloned())
    }

    fn compare_and_swap(
        &self,
        did: &Did,
        expected: Option<BlockId>,
        new: Option<Head>,
    ) -> CommitResult<()> {
        let mut heads = self.heads.write().expect("lock poisoned");
        let current = heads.get(did);
        if current.map(|h| h.commit) != expected {
            return Err(conflict(did, expected, current));
        }
        match new {
            Some(head) => heads.insert(did.clone(), head),
            None => heads.remove(did),
        };
        Ok(())
    }

    fn list(&self) -> CommitResult<Vec<(Did, Head)>> {
        let heads = self.heads.read().expect("lock poisoned");
        let mut all: Vec<(Did, Head)> = heads
            .iter()
            .map(|(did, head)| (did.clone(), head.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }
}

#[derive(Serialize, Deserialize)]
struct HeadFile {
    did: Did,
    head: Head,
}

/// One JSON file per identity, replaced through a temporary file and an
/// atomic rename so readers never see a partial head.
pub struct FileHeadStore {
    dir: PathBuf,
    swap: Mutex<()>,
}

impl FileHeadStore {
    pub fn open(dir: impl AsRef<Path>) -> CommitResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "head store opened");
        Ok(Self {
            dir,
            swap: Mutex::new(()),
        })
    }

    fn path_for(&self, did: &Did) -> PathBuf {
        self.dir.join(format!("{}.head", hex::encode(did.as_str())))
    }

    fn read_file(path: &Path) -> CommitResult<Option<HeadFile>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e).into())
    }
}

impl HeadStore for FileHeadStore {
    fn get(&self, did: &Did) -> CommitResult<Option<Head>> {
        Ok(Self::read_file(&self.path_for(did))?.map(|f| f.head))
    }

    fn compare_and_swap(
        &self,
        did: &Did,
        expected: Option<BlockId>,
        new: Option<Head>,
    ) -> CommitResult<()> {
        let _guard = self.swap.lock().expect("lock poisoned");
        let path = self.path_for(did);
        let current = Self::read_file(&path)?.map(|f| f.head);
        if current.as_ref().map(|h| h.commit) != expected {
            return Err(conflict(did, expected, current.as_ref()));
        }
        match new {
            Some(head) => {
                let body = serde_json::to_vec_pretty(&HeadFile {
                    did: did.clone(),
                    head,
                })
                .map_err(|e| CommitError::Encoding(e.to_string()))?;
                let mut tmp = NamedTempFile::new_in(&self.dir)?;
                tmp.write_all(&body)?;
                tmp.as_file().sync_all()?;
                tmp.persist(&path).map_err(|e| e.error)?;
            }
            None => match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    fn list(&self) -> CommitResult<Vec<(Did, Head)>> {
        let mut all = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("head") {
                continue;
            }
            match Self::read_file(&path) {
                Ok(Some(file)) => all.push((file.did, file.head)),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "unreadable head file; skipping"),
            }
        }
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }
}

impl std::fmt::Debug for FileHeadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHeadStore")
            .field("dir", &self.dir)
            .finish()
    }
}
