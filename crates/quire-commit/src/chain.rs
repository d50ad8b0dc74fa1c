use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use quire_crypto::{ChainError, ChainVerifier, Signer};
use quire_identity::IdentityMap;
use quire_store::{BlockStore, DeltaSession, RetryPolicy};
use quire_types::{BlockId, Did, OpContext, ShardId, Tid};
use tracing::{debug, info, warn};

use crate::commit::{CommitEntry, UnsignedCommit};
use crate::error::{CommitError, CommitResult};
use crate::head::{Head, HeadStore};

/// A page of commits, newest first.
#[derive(Clone, Debug, Default)]
pub struct CommitPage {
    pub commits: Vec<CommitEntry>,
    /// Version of the last commit returned when more remain.
    pub cursor: Option<u64>,
}

/// Exclusive right to write one identity's chain.
///
/// Held for the whole read-modify-write of a commit; dropping it releases
/// the identity.
pub struct WriteLease<'a> {
    registry: &'a Mutex<HashSet<Did>>,
    did: Did,
}

impl WriteLease<'_> {
    pub fn did(&self) -> &Did {
        &self.did
    }
}

impl Drop for WriteLease<'_> {
    fn drop(&mut self) {
        self.registry
            .lock()
            .expect("lock poisoned")
            .remove(&self.did);
    }
}

impl std::fmt::Debug for WriteLease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteLease").field("did", &self.did).finish()
    }
}

/// Per-identity commit chains over a shared block store.
pub struct CommitChain {
    blocks: Arc<dyn BlockStore>,
    heads: Arc<dyn HeadStore>,
    identities: Arc<IdentityMap>,
    retry: RetryPolicy,
    in_flight: Mutex<HashSet<Did>>,
}

impl CommitChain {
    pub fn new(
        blocks: Arc<dyn BlockStore>,
        heads: Arc<dyn HeadStore>,
        identities: Arc<IdentityMap>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            blocks,
            heads,
            identities,
            retry,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn heads(&self) -> &Arc<dyn HeadStore> {
        &self.heads
    }

    /// Claim the identity for writing. A second claim while the first is
    /// held fails with `Busy`.
    pub fn begin_write(&self, did: &Did) -> CommitResult<WriteLease<'_>> {
        let mut in_flight = self.in_flight.lock().expect("lock poisoned");
        if !in_flight.insert(did.clone()) {
            debug!(%did, "write rejected; another write in flight");
            return Err(CommitError::Busy(did.clone()));
        }
        Ok(WriteLease {
            registry: &self.in_flight,
            did: did.clone(),
        })
    }

    pub fn head(&self, did: &Did) -> CommitResult<Option<Head>> {
        self.heads.get(did)
    }

    /// Append a commit publishing `new_root`.
    ///
    /// `delta` holds the tree and record blocks of the new state; the signed
    /// commit is added to it and the whole delta is flushed as one batch
    /// before the head is swapped. Any failure before the swap leaves the
    /// head untouched.
    pub fn append(
        &self,
        lease: &WriteLease<'_>,
        expected_head: Option<BlockId>,
        new_root: BlockId,
        mut delta: DeltaSession,
        signer: &dyn Signer,
        ctx: &OpContext,
    ) -> CommitResult<CommitEntry> {
        let did = lease.did();
        ctx.check()?;

        let current = self.heads.get(did)?;
        if current.as_ref().map(|h| h.commit) != expected_head {
            return Err(CommitError::Conflict {
                did: did.clone(),
                expected: expected_head,
                actual: current.map(|h| h.commit),
            });
        }

        let unsigned = UnsignedCommit {
            did: did.clone(),
            version: current.as_ref().map_or(1, |h| h.version + 1),
            prev: current.as_ref().map(|h| h.commit),
            data: new_root,
            rev: Tid::next_after(current.as_ref().map(|h| &h.rev)),
            signing_key_id: signer.key_id(),
            created_at: Utc::now(),
        };
        let entry = CommitEntry::new(unsigned.sign(signer)?)?;
        delta.put(entry.bytes.clone());

        ctx.check()?;
        let report = delta.flush(ctx)?;

        let head = Head {
            commit: entry.id,
            data: new_root,
            version: entry.commit.version(),
            rev: entry.commit.rev(),
        };
        self.heads.compare_and_swap(did, expected_head, Some(head))?;
        info!(
            %did,
            commit = %entry.id,
            version = entry.commit.version(),
            rev = %entry.commit.rev(),
            blocks = report.blocks,
            "commit appended"
        );
        Ok(entry)
    }

    /// Move the head to an already stored commit, as after an import.
    pub fn publish(
        &self,
        lease: &WriteLease<'_>,
        expected_head: Option<BlockId>,
        head: Head,
    ) -> CommitResult<()> {
        let commit = head.commit;
        self.heads
            .compare_and_swap(lease.did(), expected_head, Some(head))?;
        info!(did = %lease.did(), %commit, "head published");
        Ok(())
    }

    /// Remove the head, leaving the identity without commits.
    pub fn clear(&self, lease: &WriteLease<'_>) -> CommitResult<()> {
        let current = self.heads.get(lease.did())?;
        if let Some(head) = current {
            self.heads
                .compare_and_swap(lease.did(), Some(head.commit), None)?;
        }
        Ok(())
    }

    fn shard(&self, did: &Did) -> CommitResult<ShardId> {
        Ok(self.identities.get_uid(did)?)
    }

    /// Load a commit of `did` by address. Blocks that are not commits are
    /// reported as not found.
    pub fn get_commit(&self, did: &Did, id: &BlockId) -> CommitResult<CommitEntry> {
        let shard = self.shard(did)?;
        match self.load(did, shard, id) {
            Err(CommitError::Decode { .. }) => Err(CommitError::NotFound {
                did: did.clone(),
                id: *id,
            }),
            other => other,
        }
    }

    fn load(&self, did: &Did, shard: ShardId, id: &BlockId) -> CommitResult<CommitEntry> {
        let stored = self
            .retry
            .run(|| self.blocks.get(shard, id))?
            .ok_or_else(|| CommitError::NotFound {
                did: did.clone(),
                id: *id,
            })?;
        CommitEntry::from_block(*id, stored.data)
    }

    /// Commits newest first, starting below the `cursor` version.
    pub fn list_commits(&self, did: &Did, limit: usize, cursor: Option<u64>) -> CommitResult<CommitPage> {
        let mut page = CommitPage::default();
        let Some(head) = self.heads.get(did)? else {
            return Ok(page);
        };
        if limit == 0 {
            return Ok(page);
        }
        let shard = self.shard(did)?;
        let mut next = Some(head.commit);
        while let Some(id) = next {
            let entry = self.load(did, shard, &id)?;
            next = entry.commit.prev();
            if cursor.is_some_and(|c| entry.commit.version() >= c) {
                continue;
            }
            if page.commits.len() == limit {
                page.cursor = page.commits.last().map(|e| e.commit.version());
                break;
            }
            page.commits.push(entry);
        }
        Ok(page)
    }

    /// Every commit from the head back to genesis, newest first.
    pub fn walk(&self, did: &Did, ctx: &OpContext) -> CommitResult<Vec<CommitEntry>> {
        let Some(head) = self.heads.get(did)? else {
            return Ok(Vec::new());
        };
        let shard = self.shard(did)?;
        let mut out = Vec::new();
        let mut next = Some(head.commit);
        while let Some(id) = next {
            ctx.check()?;
            let entry = self.load(did, shard, &id)?;
            next = entry.commit.prev();
            out.push(entry);
        }
        Ok(out)
    }

    /// Commits with a revision after `since`, oldest first.
    pub fn commits_since(&self, did: &Did, since: Option<Tid>, ctx: &OpContext) -> CommitResult<Vec<CommitEntry>> {
        let Some(head) = self.heads.get(did)? else {
            return Ok(Vec::new());
        };
        let shard = self.shard(did)?;
        let mut out = Vec::new();
        let mut next = Some(head.commit);
        while let Some(id) = next {
            ctx.check()?;
            let entry = self.load(did, shard, &id)?;
            if since.is_some_and(|s| entry.commit.rev() <= s) {
                break;
            }
            next = entry.commit.prev();
            out.push(entry);
        }
        out.reverse();
        Ok(out)
    }

    /// Find the commit carrying revision `rev`.
    pub fn find_by_rev(&self, did: &Did, rev: Tid, ctx: &OpContext) -> CommitResult<Option<CommitEntry>> {
        let Some(head) = self.heads.get(did)? else {
            return Ok(None);
        };
        let shard = self.shard(did)?;
        let mut next = Some(head.commit);
        while let Some(id) = next {
            ctx.check()?;
            let entry = self.load(did, shard, &id)?;
            if entry.commit.rev() == rev {
                return Ok(Some(entry));
            }
            if entry.commit.rev() < rev {
                break;
            }
            next = entry.commit.prev();
        }
        Ok(None)
    }

    /// Walk the whole chain checking links, versions, revision order,
    /// addresses and signatures. Returns the number of commits.
    pub fn verify_chain(&self, did: &Did, ctx: &OpContext) -> CommitResult<usize> {
        let mut links = self.walk(did, ctx)?;
        links.reverse();
        verify_links(did, &links)?;
        debug!(%did, commits = links.len(), "commit chain verified");
        Ok(links.len())
    }
}

/// Check a chain given oldest first.
pub fn verify_links(did: &Did, links: &[CommitEntry]) -> CommitResult<()> {
    verify_extension(did, None, links)
}

/// Check that `links` (oldest first) directly extend `anchor`, or start at
/// genesis when there is no anchor: links, versions, addresses, strictly
/// increasing revisions and signatures.
///
/// Every commit must name either `did` or the DID of the first commit: an
/// imported chain keeps the DID it was signed for, and later local commits
/// name the local identity.
pub fn verify_extension(did: &Did, anchor: Option<&CommitEntry>, links: &[CommitEntry]) -> CommitResult<()> {
    let broken = |source: ChainError| CommitError::Chain {
        did: did.clone(),
        source,
    };
    match anchor {
        None => ChainVerifier::verify_chain(links).map_err(broken)?,
        Some(anchor) => {
            let mut prev = anchor;
            for (index, link) in links.iter().enumerate() {
                ChainVerifier::verify_link(prev, link, index).map_err(broken)?;
                ChainVerifier::verify_address(link, index).map_err(broken)?;
                prev = link;
            }
        }
    }

    let origin = anchor.or(links.first()).map(|e| e.commit.did());
    if let Some(origin) = origin.filter(|o| *o != did) {
        debug!(%did, %origin, "verifying chain imported from another identity");
    }
    let mut prev_rev = anchor.map(|a| a.commit.rev());
    for entry in links {
        let version = entry.commit.version();
        if entry.commit.did() != did && Some(entry.commit.did()) != origin {
            return Err(CommitError::Inconsistent {
                did: did.clone(),
                version,
                reason: format!("commit belongs to {}", entry.commit.did()),
            });
        }
        if prev_rev.is_some_and(|p| entry.commit.rev() <= p) {
            return Err(CommitError::Inconsistent {
                did: did.clone(),
                version,
                reason: "revision does not increase".into(),
            });
        }
        if let Err(e) = entry.commit.verify_self_signed() {
            warn!(%did, version, error = %e, "commit signature check failed");
            return Err(e);
        }
        prev_rev = Some(entry.commit.rev());
    }
    Ok(())
}

impl std::fmt::Debug for CommitChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitChain")
            .field("in_flight", &self.in_flight.lock().map(|s| s.len()).unwrap_or(0))
            .finish()
    }
}
