use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use quire_store::framing;
use quire_types::{Did, ShardId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IdentityError, IdentityResult};

/// One persisted mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRow {
    pub did: Did,
    pub uid: ShardId,
}

/// Everything needed to rebuild the identity cache.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableSnapshot {
    pub rows: Vec<IdentityRow>,
    /// Highest shard id ever allocated, live or removed.
    pub high_water: Option<ShardId>,
}

/// Persistent storage for identity rows.
///
/// Writes must be durable when they return: the map persists a row before
/// exposing it through the cache.
pub trait IdentityTable: Send + Sync {
    fn load(&self) -> IdentityResult<TableSnapshot>;

    /// Persist a new row. Fails with `AlreadyMapped` if the DID has a live row.
    fn insert(&self, row: &IdentityRow) -> IdentityResult<()>;

    /// Remove a live row, keeping its shard id allocated.
    fn tombstone(&self, row: &IdentityRow) -> IdentityResult<()>;
}

#[derive(Default)]
struct MemoryRows {
    live: HashMap<Did, ShardId>,
    high_water: Option<ShardId>,
}

/// `HashMap`-backed identity table for tests and embedding.
#[derive(Default)]
pub struct InMemoryIdentityTable {
    rows: RwLock<MemoryRows>,
}

impl InMemoryIdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live rows.
    pub fn row_count(&self) -> usize {
        self.rows.read().expect("lock poisoned").live.len()
    }
}

impl IdentityTable for InMemoryIdentityTable {
    fn load(&self) -> IdentityResult<TableSnapshot> {
        let rows = self.rows.read().expect("lock poisoned");
        let mut live: Vec<IdentityRow> = rows
            .live
            .iter()
            .map(|(did, uid)| IdentityRow {
                did: did.clone(),
                uid: *uid,
            })
            .collect();
        live.sort_by_key(|r| r.uid);
        Ok(TableSnapshot {
            rows: live,
            high_water: rows.high_water,
        })
    }

    fn insert(&self, row: &IdentityRow) -> IdentityResult<()> {
        let mut rows = self.rows.write().expect("lock poisoned");
        if let Some(existing) = rows.live.get(&row.did) {
            return Err(IdentityError::AlreadyMapped {
                did: row.did.clone(),
                existing: *existing,
            });
        }
        rows.live.insert(row.did.clone(), row.uid);
        rows.high_water = rows.high_water.max(Some(row.uid));
        Ok(())
    }

    fn tombstone(&self, row: &IdentityRow) -> IdentityResult<()> {
        let mut rows = self.rows.write().expect("lock poisoned");
        if rows.live.get(&row.did) == Some(&row.uid) {
            rows.live.remove(&row.did);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum LogRow {
    Insert(IdentityRow),
    Tombstone(IdentityRow),
}

/// The log file as the appender sees it.
trait LogSink: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write and sync one frame. On failure the log is cut back to `committed`,
/// so a partial frame never sits in front of later rows.
fn append_durably<S: LogSink>(sink: &mut S, committed: &mut u64, frame: &[u8]) -> io::Result<()> {
    let result = sink
        .write_all(frame)
        .and_then(|()| sink.flush())
        .and_then(|()| sink.sync());
    if let Err(e) = result {
        if let Err(cut) = sink.truncate(*committed) {
            warn!(error = %cut, committed = *committed, "failed to cut back identity log");
        }
        return Err(e);
    }
    *committed += frame.len() as u64;
    Ok(())
}

fn encode(row: &LogRow) -> IdentityResult<Vec<u8>> {
    let payload = bincode::serialize(row).map_err(|e| IdentityError::Serialization(e.to_string()))?;
    let mut frame = Vec::with_capacity(payload.len() + 8);
    framing::write_frame(&mut frame, &payload)?;
    Ok(frame)
}

struct LogFile {
    file: File,
    /// Length up to the end of the last durable frame.
    len: u64,
}

/// Append-only identity log.
///
/// Every insert or tombstone is one bincode row framed with a length and a
/// CRC32 checksum, synced before the call returns. Loading replays the log
/// front to back; torn or corrupt frames are skipped.
pub struct FileIdentityTable {
    path: PathBuf,
    log: Mutex<LogFile>,
    live: RwLock<HashMap<Did, ShardId>>,
}

impl FileIdentityTable {
    pub fn open(path: impl AsRef<Path>) -> IdentityResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let (snapshot, valid_len) = Self::replay(&path)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            warn!(path = %path.display(), file_len, valid_len, "truncating torn identity log tail");
            file.set_len(valid_len)?;
        }
        let len = file_len.min(valid_len);
        let live = snapshot
            .rows
            .into_iter()
            .map(|r| (r.did, r.uid))
            .collect();
        Ok(Self {
            path,
            log: Mutex::new(LogFile { file, len }),
            live: RwLock::new(live),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(path: &Path) -> IdentityResult<(TableSnapshot, u64)> {
        let scan = framing::scan_frames(path)?;
        let mut live: HashMap<Did, ShardId> = HashMap::new();
        let mut high_water: Option<ShardId> = None;
        for frame in &scan.frames {
            match bincode::deserialize::<LogRow>(&frame.payload) {
                Ok(LogRow::Insert(row)) => {
                    high_water = high_water.max(Some(row.uid));
                    live.insert(row.did, row.uid);
                }
                Ok(LogRow::Tombstone(row)) => {
                    high_water = high_water.max(Some(row.uid));
                    if live.get(&row.did) == Some(&row.uid) {
                        live.remove(&row.did);
                    }
                }
                Err(e) => {
                    warn!(offset = frame.offset, error = %e, "undecodable identity row; skipping");
                }
            }
        }
        let mut rows: Vec<IdentityRow> = live
            .into_iter()
            .map(|(did, uid)| IdentityRow { did, uid })
            .collect();
        rows.sort_by_key(|r| r.uid);
        debug!(path = %path.display(), rows = rows.len(), "identity log replayed");
        Ok((TableSnapshot { rows, high_water }, scan.valid_len))
    }

    fn append(&self, row: &LogRow) -> IdentityResult<()> {
        let frame = encode(row)?;
        let mut log = self.log.lock().expect("lock poisoned");
        let LogFile { file, len } = &mut *log;
        append_durably(file, len, &frame)?;
        Ok(())
    }
}

impl IdentityTable for FileIdentityTable {
    fn load(&self) -> IdentityResult<TableSnapshot> {
        Self::replay(&self.path).map(|(snapshot, _)| snapshot)
    }

    fn insert(&self, row: &IdentityRow) -> IdentityResult<()> {
        let mut live = self.live.write().expect("lock poisoned");
        if let Some(existing) = live.get(&row.did) {
            return Err(IdentityError::AlreadyMapped {
                did: row.did.clone(),
                existing: *existing,
            });
        }
        self.append(&LogRow::Insert(row.clone()))?;
        live.insert(row.did.clone(), row.uid);
        Ok(())
    }

    fn tombstone(&self, row: &IdentityRow) -> IdentityResult<()> {
        let mut live = self.live.write().expect("lock poisoned");
        self.append(&LogRow::Tombstone(row.clone()))?;
        if live.get(&row.did) == Some(&row.uid) {
            live.remove(&row.did);
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileIdentityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIdentityTable")
            .field("path", &self.path)
            .finish()
    }
}
