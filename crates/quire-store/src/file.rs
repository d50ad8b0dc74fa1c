use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use quire_crypto::ContentHasher;
use quire_types::{BlockId, ShardId};
use tracing::{debug, info, warn};

use crate::block::{Block, RetainReport, ShardStats, StoredBlock};
use crate::error::{StoreError, StoreResult};
use crate::framing::{self, FRAME_HEADER_LEN};
use crate::traits::BlockStore;

// Frame payload layouts:
//   block:  [TAG_BLOCK][generation u64 LE][address 32][data]
//   commit: [TAG_COMMIT][generation u64 LE][block count u32 LE]
//   remove: [TAG_REMOVE][address 32]*
const TAG_BLOCK: u8 = 1;
const TAG_COMMIT: u8 = 2;
const TAG_REMOVE: u8 = 3;
const BLOCK_PREFIX_LEN: usize = 1 + 8 + BlockId::LEN;
const COMMIT_LEN: usize = 1 + 8 + 4;

#[derive(Clone, Copy, Debug)]
struct Location {
    /// Offset of the block data within the segment file.
    offset: u64,
    len: u32,
    generation: u64,
}

/// One shard's append-only segment.
///
/// Appends serialize on `writer` and take the `view` lock only to publish
/// index entries once their batch is durable. Readers read by position
/// through the view's own handle and never wait for an fsync.
struct Segment {
    writer: Mutex<Appender>,
    view: RwLock<View>,
}

struct Appender {
    path: PathBuf,
    file: File,
    len: u64,
}

/// What readers see: committed blocks only.
struct View {
    file: Arc<File>,
    generation: u64,
    index: HashMap<BlockId, Location>,
}

impl Segment {
    fn open(path: &Path, shard: ShardId) -> StoreResult<Self> {
        let (writer, view) = load(path, shard)?;
        Ok(Self {
            writer: Mutex::new(writer),
            view: RwLock::new(view),
        })
    }

    fn lookup(&self, id: &BlockId) -> Option<(Location, Arc<File>)> {
        let view = self.view.read().expect("lock poisoned");
        view.index.get(id).map(|loc| (*loc, Arc::clone(&view.file)))
    }

    fn contains(&self, id: &BlockId) -> bool {
        self.view.read().expect("lock poisoned").index.contains_key(id)
    }

    fn generation(&self) -> u64 {
        self.view.read().expect("lock poisoned").generation
    }

    fn stats(&self) -> ShardStats {
        let view = self.view.read().expect("lock poisoned");
        ShardStats {
            blocks: view.index.len(),
            bytes: view.index.values().map(|l| l.len as u64).sum(),
            generation: view.generation,
        }
    }
}

/// Replay a segment file into an appender and a view, truncating any tail
/// past the last complete commit or removal frame.
fn load(path: &Path, shard: ShardId) -> StoreResult<(Appender, View)> {
    let scan = framing::scan_frames(path)?;
    let mut index = HashMap::new();
    let mut generation = 0;
    let mut pending: Vec<(BlockId, Location)> = Vec::new();
    let mut committed_len = 0;

    for frame in &scan.frames {
        let payload = &frame.payload;
        let end = frame.offset + FRAME_HEADER_LEN + payload.len() as u64;
        match payload.first() {
            Some(&TAG_BLOCK) if payload.len() >= BLOCK_PREFIX_LEN => {
                let batch_gen = read_u64(&payload[1..9]);
                let id = BlockId::from_slice(&payload[9..BLOCK_PREFIX_LEN]).map_err(|e| {
                    StoreError::CorruptSegment {
                        shard,
                        reason: e.to_string(),
                    }
                })?;
                pending.push((
                    id,
                    Location {
                        offset: frame.offset + FRAME_HEADER_LEN + BLOCK_PREFIX_LEN as u64,
                        len: (payload.len() - BLOCK_PREFIX_LEN) as u32,
                        generation: batch_gen,
                    },
                ));
            }
            Some(&TAG_COMMIT) if payload.len() == COMMIT_LEN => {
                let batch_gen = read_u64(&payload[1..9]);
                let count = u32::from_le_bytes([payload[9], payload[10], payload[11], payload[12]]);
                let complete = count as usize == pending.len()
                    && pending.iter().all(|(_, loc)| loc.generation == batch_gen);
                if complete {
                    for (id, loc) in pending.drain(..) {
                        index.entry(id).or_insert(loc);
                    }
                    generation = generation.max(batch_gen);
                } else {
                    warn!(
                        %shard,
                        generation = batch_gen,
                        expected = count,
                        found = pending.len(),
                        "incomplete batch in segment; discarding"
                    );
                    pending.clear();
                }
                committed_len = end;
            }
            Some(&TAG_REMOVE) if (payload.len() - 1) % BlockId::LEN == 0 => {
                for chunk in payload[1..].chunks(BlockId::LEN) {
                    if let Ok(id) = BlockId::from_slice(chunk) {
                        index.remove(&id);
                    }
                }
                committed_len = end;
            }
            _ => {
                return Err(StoreError::CorruptSegment {
                    shard,
                    reason: format!("unrecognized frame at offset {}", frame.offset),
                })
            }
        }
    }
    if !pending.is_empty() {
        warn!(%shard, blocks = pending.len(), "uncommitted batch at end of segment; discarding");
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let file_len = file.metadata()?.len();
    if file_len > committed_len {
        warn!(%shard, file_len, committed_len, "truncating segment tail");
        file.set_len(committed_len)?;
    }
    let reader = File::open(path)?;
    debug!(%shard, blocks = index.len(), generation, "segment opened");

    Ok((
        Appender {
            path: path.to_path_buf(),
            file,
            len: committed_len,
        },
        View {
            file: Arc::new(reader),
            generation,
            index,
        },
    ))
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn read_block(file: &File, loc: Location) -> io::Result<Vec<u8>> {
    let mut data = vec![0u8; loc.len as usize];
    read_exact_at(file, &mut data, loc.offset)?;
    Ok(data)
}

fn block_frame(buf: &mut Vec<u8>, block: &Block, generation: u64) -> io::Result<()> {
    let mut payload = Vec::with_capacity(BLOCK_PREFIX_LEN + block.data.len());
    payload.push(TAG_BLOCK);
    payload.extend_from_slice(&generation.to_le_bytes());
    payload.extend_from_slice(block.id.as_bytes());
    payload.extend_from_slice(&block.data);
    framing::write_frame(buf, &payload)?;
    Ok(())
}

fn commit_frame<W: Write>(out: &mut W, generation: u64, count: usize) -> io::Result<()> {
    let mut commit = Vec::with_capacity(COMMIT_LEN);
    commit.push(TAG_COMMIT);
    commit.extend_from_slice(&generation.to_le_bytes());
    commit.extend_from_slice(&(count as u32).to_le_bytes());
    framing::write_frame(out, &commit)?;
    Ok(())
}

impl Appender {
    /// Append one batch and its commit frame with a single write. Returns
    /// where each block landed.
    fn append_batch(&mut self, blocks: &[&Block], generation: u64) -> StoreResult<Vec<(BlockId, Location)>> {
        let mut buf = Vec::new();
        let mut located = Vec::with_capacity(blocks.len());
        for block in blocks {
            let frame_start = self.len + buf.len() as u64;
            block_frame(&mut buf, block, generation)?;
            located.push((
                block.id,
                Location {
                    offset: frame_start + FRAME_HEADER_LEN + BLOCK_PREFIX_LEN as u64,
                    len: block.data.len() as u32,
                    generation,
                },
            ));
        }
        commit_frame(&mut buf, generation, blocks.len())?;
        self.write_durably(&buf)?;
        Ok(located)
    }

    fn append_remove(&mut self, ids: &[BlockId]) -> StoreResult<()> {
        let mut payload = Vec::with_capacity(1 + ids.len() * BlockId::LEN);
        payload.push(TAG_REMOVE);
        for id in ids {
            payload.extend_from_slice(id.as_bytes());
        }
        let mut buf = Vec::new();
        framing::write_frame(&mut buf, &payload)?;
        self.write_durably(&buf)
    }

    fn write_durably(&mut self, buf: &[u8]) -> StoreResult<()> {
        let result = self
            .file
            .write_all(buf)
            .and_then(|()| self.file.sync_data());
        if let Err(e) = result {
            // Cut off whatever part of the write landed so the next append
            // starts on a frame boundary.
            let _ = self.file.set_len(self.len);
            return Err(e.into());
        }
        self.len += buf.len() as u64;
        Ok(())
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(arr)
}

/// Disk-backed block store with one append-only segment file per shard.
///
/// Each batch is written as a run of block frames closed by a commit frame;
/// on open, block frames without their commit frame are discarded, which
/// keeps batches all-or-nothing across crashes. Segments are opened lazily
/// and indexed in memory; block bytes are read from disk on demand and
/// re-verified against their address.
pub struct FileBlockStore {
    root: PathBuf,
    segments: RwLock<HashMap<ShardId, Arc<Segment>>>,
}

impl FileBlockStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            segments: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn segment_path(&self, shard: ShardId) -> PathBuf {
        self.root.join(format!("{:016x}.seg", shard.get()))
    }

    /// The shard's segment, or `None` if nothing was ever written to it.
    fn existing_segment(&self, shard: ShardId) -> StoreResult<Option<Arc<Segment>>> {
        if let Some(seg) = self.segments.read().expect("lock poisoned").get(&shard) {
            return Ok(Some(Arc::clone(seg)));
        }
        if !self.segment_path(shard).exists() {
            return Ok(None);
        }
        self.segment_for_write(shard).map(Some)
    }

    fn segment_for_write(&self, shard: ShardId) -> StoreResult<Arc<Segment>> {
        let mut segments = self.segments.write().expect("lock poisoned");
        if let Some(seg) = segments.get(&shard) {
            return Ok(Arc::clone(seg));
        }
        let seg = Arc::new(Segment::open(&self.segment_path(shard), shard)?);
        segments.insert(shard, Arc::clone(&seg));
        Ok(seg)
    }
}

impl BlockStore for FileBlockStore {
    fn get(&self, shard: ShardId, id: &BlockId) -> StoreResult<Option<StoredBlock>> {
        let Some(seg) = self.existing_segment(shard)? else {
            return Ok(None);
        };
        let Some((loc, file)) = seg.lookup(id) else {
            return Ok(None);
        };
        let data = read_block(&file, loc)?;
        let computed = ContentHasher::BLOCK.hash(&data);
        if computed != *id {
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(Some(StoredBlock {
            data,
            generation: loc.generation,
        }))
    }

    fn has(&self, shard: ShardId, id: &BlockId) -> StoreResult<bool> {
        Ok(match self.existing_segment(shard)? {
            Some(seg) => seg.contains(id),
            None => false,
        })
    }

    fn put_batch(&self, shard: ShardId, blocks: &[Block]) -> StoreResult<u64> {
        for block in blocks {
            block.verify()?;
        }
        let seg = self.segment_for_write(shard)?;
        let mut appender = seg.writer.lock().expect("lock poisoned");

        let (fresh, current) = {
            let view = seg.view.read().expect("lock poisoned");
            let mut seen = HashSet::new();
            let fresh: Vec<&Block> = blocks
                .iter()
                .filter(|b| !view.index.contains_key(&b.id) && seen.insert(b.id))
                .collect();
            (fresh, view.generation)
        };
        if fresh.is_empty() {
            return Ok(current);
        }
        let generation = current + 1;
        let located = appender.append_batch(&fresh, generation)?;

        let mut view = seg.view.write().expect("lock poisoned");
        view.index.extend(located);
        view.generation = generation;
        debug!(%shard, generation, written = fresh.len(), "batch appended to segment");
        Ok(generation)
    }

    fn remove_batch(&self, shard: ShardId, ids: &[BlockId]) -> StoreResult<usize> {
        let Some(seg) = self.existing_segment(shard)? else {
            return Ok(0);
        };
        let mut appender = seg.writer.lock().expect("lock poisoned");
        let present: Vec<BlockId> = ids.iter().filter(|id| seg.contains(id)).copied().collect();
        if !present.is_empty() {
            appender.append_remove(&present)?;
            let mut view = seg.view.write().expect("lock poisoned");
            for id in &present {
                view.index.remove(id);
            }
        }
        Ok(present.len())
    }

    fn list(&self, shard: ShardId) -> StoreResult<Vec<BlockId>> {
        let Some(seg) = self.existing_segment(shard)? else {
            return Ok(Vec::new());
        };
        let mut ids: Vec<BlockId> = seg
            .view
            .read()
            .expect("lock poisoned")
            .index
            .keys()
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn wipe(&self, shard: ShardId) -> StoreResult<()> {
        let removed = self.segments.write().expect("lock poisoned").remove(&shard);
        // Hold the append lock while deleting so in-flight writers finish first.
        let _guard = removed.as_ref().map(|seg| seg.writer.lock().expect("lock poisoned"));
        match fs::remove_file(self.segment_path(shard)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(%shard, "shard wiped");
        Ok(())
    }

    fn shard_stats(&self, shard: ShardId) -> StoreResult<ShardStats> {
        Ok(match self.existing_segment(shard)? {
            Some(seg) => seg.stats(),
            None => ShardStats::default(),
        })
    }

    fn generation(&self, shard: ShardId) -> StoreResult<u64> {
        Ok(match self.existing_segment(shard)? {
            Some(seg) => seg.generation(),
            None => 0,
        })
    }

    /// Rewrite the segment with only the kept blocks, then swap it in with an
    /// atomic rename. Generations of kept blocks are preserved. Readers keep
    /// using the old file until the new view is published.
    fn retain(&self, shard: ShardId, keep: &HashSet<BlockId>) -> StoreResult<RetainReport> {
        let Some(seg) = self.existing_segment(shard)? else {
            return Ok(RetainReport::default());
        };
        let mut appender = seg.writer.lock().expect("lock poisoned");
        let (entries, file, generation) = {
            let view = seg.view.read().expect("lock poisoned");
            let entries: Vec<(BlockId, Location)> = view.index.iter().map(|(k, v)| (*k, *v)).collect();
            (entries, Arc::clone(&view.file), view.generation)
        };

        let mut report = RetainReport::default();
        let mut by_generation: BTreeMap<u64, Vec<Block>> = BTreeMap::new();
        for (id, loc) in entries {
            if keep.contains(&id) {
                let data = read_block(&file, loc)?;
                by_generation
                    .entry(loc.generation)
                    .or_default()
                    .push(Block { id, data });
                report.kept += 1;
            } else {
                report.removed += 1;
                report.bytes_reclaimed += loc.len as u64;
            }
        }
        if report.removed == 0 {
            return Ok(report);
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        for (batch_gen, blocks) in &by_generation {
            let mut buf = Vec::new();
            for block in blocks {
                block_frame(&mut buf, block, *batch_gen)?;
            }
            commit_frame(&mut buf, *batch_gen, blocks.len())?;
            tmp.write_all(&buf)?;
        }
        // Preserve the shard generation even when its newest batch was dropped.
        if by_generation.keys().next_back() != Some(&generation) {
            commit_frame(&mut tmp, generation, 0)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&appender.path).map_err(|e| StoreError::Io(e.error))?;

        let (fresh_appender, fresh_view) = load(&self.segment_path(shard), shard)?;
        *appender = fresh_appender;
        *seg.view.write().expect("lock poisoned") = fresh_view;
        info!(
            %shard,
            kept = report.kept,
            removed = report.removed,
            bytes_reclaimed = report.bytes_reclaimed,
            "segment compacted"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for FileBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBlockStore")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const SHARD: ShardId = ShardId::new(7);

    fn block(content: &str) -> Block {
        Block::new(content.as_bytes().to_vec())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    #[test]
    fn blocks_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (block("alpha"), block("beta"));
        {
            let store = FileBlockStore::open(dir.path()).unwrap();
            store.put_batch(SHARD, &[a.clone()]).unwrap();
            store.put_batch(SHARD, &[b.clone()]).unwrap();
        }
        let store = FileBlockStore::open(dir.path()).unwrap();
        assert_eq!(store.get(SHARD, &a.id).unwrap().unwrap().data, a.data);
        let stored_b = store.get(SHARD, &b.id).unwrap().unwrap();
        assert_eq!(stored_b.generation, 2);
        assert_eq!(store.generation(SHARD).unwrap(), 2);
    }

    #[test]
    fn unknown_shard_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlockStore::open(dir.path()).unwrap();
        assert!(store.get(SHARD, &block("x").id).unwrap().is_none());
        assert!(store.list(SHARD).unwrap().is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn uncommitted_tail_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (block("committed"), block("torn"));
        {
            let store = FileBlockStore::open(dir.path()).unwrap();
            store.put_batch(SHARD, &[a.clone()]).unwrap();
        }
        // Simulate a crash between a block frame and its commit frame.
        let path = dir.path().join(format!("{:016x}.seg", SHARD.get()));
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            let mut payload = vec![TAG_BLOCK];
            payload.extend_from_slice(&2u64.to_le_bytes());
            payload.extend_from_slice(b.id.as_bytes());
            payload.extend_from_slice(&b.data);
            framing::write_frame(&mut file, &payload).unwrap();
        }
        let store = FileBlockStore::open(dir.path()).unwrap();
        assert!(store.has(SHARD, &a.id).unwrap());
        assert!(!store.has(SHARD, &b.id).unwrap());

        // New writes land after the truncated tail and survive another reopen.
        store.put_batch(SHARD, &[b.clone()]).unwrap();
        drop(store);
        let store = FileBlockStore::open(dir.path()).unwrap();
        assert!(store.has(SHARD, &b.id).unwrap());
    }

    #[test]
    fn on_disk_corruption_is_detected_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let a = block("fragile-content");
        let store = FileBlockStore::open(dir.path()).unwrap();
        store.put_batch(SHARD, &[a.clone()]).unwrap();

        // Flip a data byte; the CRC is not rechecked on point reads, the
        // address is.
        let path = dir.path().join(format!("{:016x}.seg", SHARD.get()));
        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(FRAME_HEADER_LEN + BLOCK_PREFIX_LEN as u64)).unwrap();
            file.write_all(b"F").unwrap();
        }
        let err = store.get(SHARD, &a.id).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn reads_do_not_wait_for_an_in_flight_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlockStore::open(dir.path()).unwrap();
        let a = block("readable");
        store.put_batch(SHARD, &[a.clone()]).unwrap();
        let seg = store.segment_for_write(SHARD).unwrap();
        let store = &store;

        thread::scope(|s| {
            // Held the way a batch holds it across its write and fsync.
            let appending = seg.writer.lock().unwrap();
            let (tx, rx) = mpsc::channel();
            let id = a.id;
            s.spawn(move || {
                let data = store.get(SHARD, &id).unwrap().map(|b| b.data);
                let stats = store.shard_stats(SHARD).unwrap();
                tx.send((data, stats.blocks)).unwrap();
            });
            let (data, blocks) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(data, Some(a.data));
            assert_eq!(blocks, 1);
            drop(appending);
        });
    }

    #[test]
    fn retain_swaps_in_the_rewritten_file_for_readers() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlockStore::open(dir.path()).unwrap();
        let blocks: Vec<Block> = (0..20).map(|i| block(&format!("block {i}"))).collect();
        store.put_batch(SHARD, &blocks).unwrap();

        let keep: HashSet<BlockId> = blocks.iter().step_by(2).map(|b| b.id).collect();
        store.retain(SHARD, &keep).unwrap();
        for (i, b) in blocks.iter().enumerate() {
            let got = store.get(SHARD, &b.id).unwrap();
            assert_eq!(got.map(|s| s.data), (i % 2 == 0).then(|| b.data.clone()));
        }
        // Appends continue at the end of the rewritten file.
        let late = block("after compaction");
        store.put_batch(SHARD, &[late.clone()]).unwrap();
        assert_eq!(store.get(SHARD, &late.id).unwrap().unwrap().data, late.data);
    }

    // -----------------------------------------------------------------------
    // Removal and compaction
    // -----------------------------------------------------------------------

    #[test]
    fn removal_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let a = block("gone");
        {
            let store = FileBlockStore::open(dir.path()).unwrap();
            store.put_batch(SHARD, &[a.clone()]).unwrap();
            assert_eq!(store.remove_batch(SHARD, &[a.id]).unwrap(), 1);
        }
        let store = FileBlockStore::open(dir.path()).unwrap();
        assert!(!store.has(SHARD, &a.id).unwrap());
    }

    #[test]
    fn retain_rewrites_segment() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlockStore::open(dir.path()).unwrap();
        let (a, b, c) = (block("keep-me"), block("drop-me"), block("late"));
        store.put_batch(SHARD, &[a.clone(), b.clone()]).unwrap();
        store.put_batch(SHARD, &[c.clone()]).unwrap();
        let path = dir.path().join(format!("{:016x}.seg", SHARD.get()));
        let before = fs::metadata(&path).unwrap().len();

        let keep: HashSet<BlockId> = [a.id].into_iter().collect();
        let report = store.retain(SHARD, &keep).unwrap();
        assert_eq!(report.kept, 1);
        assert_eq!(report.removed, 2);
        assert_eq!(report.bytes_reclaimed, (b.len() + c.len()) as u64);
        assert!(fs::metadata(&path).unwrap().len() < before);

        assert_eq!(store.get(SHARD, &a.id).unwrap().unwrap().generation, 1);
        assert_eq!(store.generation(SHARD).unwrap(), 2);
        drop(store);

        let store = FileBlockStore::open(dir.path()).unwrap();
        assert_eq!(store.list(SHARD).unwrap(), vec![a.id]);
        assert_eq!(store.generation(SHARD).unwrap(), 2);
    }

    #[test]
    fn wipe_deletes_segment() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlockStore::open(dir.path()).unwrap();
        store.put_batch(SHARD, &[block("x")]).unwrap();
        store.wipe(SHARD).unwrap();
        assert_eq!(store.shard_stats(SHARD).unwrap(), ShardStats::default());
        assert!(!dir.path().join(format!("{:016x}.seg", SHARD.get())).exists());
    }
}
