use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::Arc;

use quire_car::{CarHeader, CarReader, CarWriter};
use quire_commit::{verify_extension, CommitEntry, Head};
use quire_crypto::ContentHasher;
use quire_mst::{diff, Mst};
use quire_store::{Block, DeltaSession, ReadSession};
use quire_types::{BlockId, Did, OpContext, Tid};
use tracing::{debug, info};

use crate::error::{RepoError, RepoResult};
use crate::model::{ExportSummary, ImportSummary};
use crate::service::RepoService;

/// Every node and record block of the tree at `root`.
fn whole_tree(session: &ReadSession, root: BlockId) -> RepoResult<Vec<BlockId>> {
    let tree = Mst::load(session, root);
    let mut ids = tree.node_ids()?;
    ids.extend(tree.leaves()?.into_iter().map(|(_, cid)| cid));
    Ok(ids)
}

fn corrupt(did: &Did, reason: impl Into<String>) -> RepoError {
    RepoError::CorruptArchive {
        did: did.clone(),
        reason: reason.into(),
    }
}

impl RepoService {
    /// Export into a buffer. See [`RepoService::export_to`].
    pub fn export_repository(&self, did: &Did, since: Option<Tid>, ctx: &OpContext) -> RepoResult<Vec<u8>> {
        let mut out = Vec::new();
        self.export_to(did, since, &mut out, ctx)?;
        Ok(out)
    }

    /// Stream an archive of `did` rooted at its head commit.
    ///
    /// A full export carries the whole commit chain and every node and record
    /// of the head tree. With `since`, only commits after that revision and
    /// the blocks the tree gained since then are written; if compaction has
    /// dropped that revision's tree, the whole head tree goes instead of the
    /// difference. An identity without
    /// commits exports as a block-less archive rooted at the empty marker.
    pub fn export_to<W: Write>(
        &self,
        did: &Did,
        since: Option<Tid>,
        writer: W,
        ctx: &OpContext,
    ) -> RepoResult<ExportSummary> {
        let Some((head, session)) = self.snapshot(did)? else {
            let root = ContentHasher::empty_marker();
            CarWriter::new(CarHeader::new(vec![root]), writer).finish()?;
            debug!(%did, "exported empty repository");
            return Ok(ExportSummary {
                root,
                commits: 0,
                blocks: 0,
            });
        };

        let (commits, tree_blocks) = match since {
            None => (self.chain.walk(did, ctx)?, whole_tree(&session, head.data)?),
            Some(rev) => {
                let base = self
                    .chain
                    .find_by_rev(did, rev, ctx)?
                    .ok_or_else(|| RepoError::RevisionNotFound { did: did.clone(), rev })?;
                let commits = self.chain.commits_since(did, Some(rev), ctx)?;
                let base_root = base.commit.data();
                // Compaction keeps every commit but may have dropped the
                // tree it published; the receiver then gets the whole head
                // tree instead of a diff.
                let ids = if session.get(&base_root)?.is_some() {
                    let changes = diff(&session, Some(base_root), head.data)?;
                    let mut ids = changes.new_nodes.clone();
                    ids.extend(changes.new_values().copied());
                    ids
                } else {
                    debug!(%did, %rev, "base tree compacted away, shipping the head tree");
                    whole_tree(&session, head.data)?
                };
                (commits, ids)
            }
        };

        let mut car = CarWriter::new(CarHeader::new(vec![head.commit]), writer);
        let mut written: HashSet<BlockId> = HashSet::new();
        if !commits.iter().any(|c| c.id == head.commit) {
            // An incremental export from the head itself still names its root.
            let entry = self.chain.get_commit(did, &head.commit)?;
            car.write(&entry.id, &entry.bytes)?;
            written.insert(entry.id);
        }
        for entry in &commits {
            if written.insert(entry.id) {
                car.write(&entry.id, &entry.bytes)?;
            }
        }
        for id in tree_blocks {
            ctx.check()?;
            if written.insert(id) {
                let data = session.require(&id)?;
                car.write(&id, &data)?;
            }
        }
        let blocks = car.blocks_written();
        car.finish()?;

        info!(
            %did,
            root = %head.commit,
            since = ?since,
            commits = commits.len(),
            blocks,
            "repository exported"
        );
        Ok(ExportSummary {
            root: head.commit,
            commits: commits.len(),
            blocks,
        })
    }

    /// Import from a buffer. See [`RepoService::import_from`].
    pub fn import_repository(&self, did: &Did, bytes: &[u8], ctx: &OpContext) -> RepoResult<ImportSummary> {
        self.import_from(did, bytes, ctx)
    }

    /// Read an archive into `did`'s repository and publish its root commit
    /// as the new head.
    ///
    /// Every block is checked against its address while reading. The root
    /// commit's chain must lead back to the current head (or to genesis when
    /// there is none) through blocks in the archive or the shard, and every
    /// node and record of the new head tree must be present. Blocks are
    /// written as one batch before the head swap; on any failure nothing is
    /// published.
    pub fn import_from<R: Read>(&self, did: &Did, reader: R, ctx: &OpContext) -> RepoResult<ImportSummary> {
        let mut car = CarReader::new(reader)?;
        let root = match car.header().roots() {
            [root] => *root,
            roots => return Err(corrupt(did, format!("expected one root, found {}", roots.len()))),
        };
        let mut archive: HashMap<BlockId, Vec<u8>> = HashMap::new();
        while let Some((id, data)) = car.next_block()? {
            ctx.check()?;
            archive.insert(id, data);
        }

        let lease = self.chain.begin_write(did)?;
        let shard = self.identities.get_or_create_uid(did)?;
        if root == ContentHasher::empty_marker() {
            if !archive.is_empty() {
                return Err(corrupt(did, "empty-marker archive carries blocks"));
            }
            debug!(%did, "imported empty archive");
            return Ok(ImportSummary {
                head: self.chain.head(did)?,
                commits: 0,
                blocks: 0,
            });
        }

        let current = self.chain.head(did)?;
        let mut delta = DeltaSession::new(Arc::clone(&self.blocks), shard, self.config.retry);
        for (id, data) in archive {
            delta.put_block(Block { id, data })?;
        }

        let (fresh, anchor) = self.new_commits(did, root, current.as_ref(), &delta, ctx)?;
        let Some(newest) = fresh.last() else {
            delta.discard();
            debug!(%did, "archive root is already the head");
            return Ok(ImportSummary {
                head: current,
                commits: 0,
                blocks: 0,
            });
        };
        verify_extension(did, anchor.as_ref(), &fresh)?;

        {
            let tree = Mst::load(&delta, newest.commit.data());
            tree.node_ids()?;
            for (key, cid) in tree.leaves()? {
                if !delta.contains(&cid)? {
                    return Err(corrupt(did, format!("record block {cid} for {key} is missing")));
                }
            }
        }

        ctx.check()?;
        let report = delta.flush(ctx)?;
        let head = Head {
            commit: newest.id,
            data: newest.commit.data(),
            version: newest.commit.version(),
            rev: newest.commit.rev(),
        };
        self.chain
            .publish(&lease, current.map(|h| h.commit), head.clone())?;
        info!(
            %did,
            head = %head.commit,
            version = head.version,
            commits = fresh.len(),
            blocks = report.blocks,
            "repository imported"
        );
        Ok(ImportSummary {
            head: Some(head),
            commits: fresh.len(),
            blocks: report.blocks,
        })
    }

    /// Walk back from `root` to the current head, oldest first, returning the
    /// commits after it and the head commit itself as the anchor.
    fn new_commits(
        &self,
        did: &Did,
        root: BlockId,
        current: Option<&Head>,
        delta: &DeltaSession,
        ctx: &OpContext,
    ) -> RepoResult<(Vec<CommitEntry>, Option<CommitEntry>)> {
        let stop = current.map(|h| h.commit);
        let mut fresh = Vec::new();
        let mut next = Some(root);
        let mut anchor = None;
        while let Some(id) = next {
            ctx.check()?;
            let bytes = delta
                .get(&id)?
                .ok_or_else(|| corrupt(did, format!("commit {id} is missing")))?;
            let entry = CommitEntry::from_block(id, bytes).map_err(|e| corrupt(did, e.to_string()))?;
            if Some(id) == stop {
                anchor = Some(entry);
                break;
            }
            next = entry.commit.prev();
            fresh.push(entry);
        }
        if let (Some(head), None) = (current, &anchor) {
            return Err(RepoError::NotFastForward {
                did: did.clone(),
                head: head.commit,
            });
        }
        fresh.reverse();
        Ok((fresh, anchor))
    }
}
