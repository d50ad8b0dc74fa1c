use std::collections::HashSet;

use quire_mst::Mst;
use quire_types::{BlockId, Did, OpContext};
use tracing::info;

use crate::error::RepoResult;
use crate::model::{CompactionMode, CompactionReport};
use crate::service::RepoService;

impl RepoService {
    /// Drop blocks no retained tree or commit references.
    ///
    /// Every commit of the chain survives. Of the trees, the head's always
    /// does; in normal mode so do those of the configured number of prior
    /// commits, so readers holding a slightly older head keep working. Runs
    /// under the identity's write lease, so no write lands mid-sweep.
    pub fn compact(&self, did: &Did, mode: CompactionMode, ctx: &OpContext) -> RepoResult<CompactionReport> {
        let _lease = self.chain.begin_write(did)?;
        let Some((_, session)) = self.snapshot(did)? else {
            return Ok(CompactionReport::default());
        };
        let commits = self.chain.walk(did, ctx)?;
        let retained = match mode {
            CompactionMode::Normal => 1 + self.config.compaction.retained_prior_heads,
            CompactionMode::Aggressive => 1,
        };

        let mut keep: HashSet<BlockId> = commits.iter().map(|c| c.id).collect();
        let mut roots = HashSet::new();
        for entry in commits.iter().take(retained) {
            let root = entry.commit.data();
            // Trees an earlier pass dropped stay dropped.
            if roots.contains(&root) || session.get(&root)?.is_none() {
                continue;
            }
            roots.insert(root);
            ctx.check()?;
            let tree = Mst::load(&session, root);
            keep.extend(tree.node_ids()?);
            keep.extend(tree.leaves()?.into_iter().map(|(_, cid)| cid));
        }

        ctx.check()?;
        let shard = session.shard();
        let swept = self.blocks.retain(shard, &keep)?;
        let report = CompactionReport {
            retained_roots: roots.len(),
            kept: swept.kept,
            removed: swept.removed,
            bytes_reclaimed: swept.bytes_reclaimed,
        };
        info!(
            %did,
            ?mode,
            retained_roots = report.retained_roots,
            removed = report.removed,
            bytes_reclaimed = report.bytes_reclaimed,
            "repository compacted"
        );
        Ok(report)
    }
}
