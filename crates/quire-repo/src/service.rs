use std::path::Path;
use std::sync::Arc;

use quire_commit::{CommitChain, CommitEntry, CommitError, CommitPage, FileHeadStore, Head, HeadStore, InMemoryHeadStore};
use quire_crypto::{Signer, VerifyingKey};
use quire_identity::{FileIdentityTable, IdentityMap, IdentityTable, InMemoryIdentityTable};
use quire_lexicon::{validate_record_bytes, Catalog, CatalogHandle};
use quire_mst::Mst;
use quire_store::{BlockStore, DeltaSession, FileBlockStore, InMemoryBlockStore, ReadSession};
use quire_types::syntax::is_valid_nsid;
use quire_types::{BlockId, Did, OpContext, RecordPath, RecordUri, ShardId, Tid, TypeError};
use tracing::{debug, info};

use crate::config::RepoConfig;
use crate::error::{RepoError, RepoResult};
use crate::model::{Record, RecordPage, RepoInfo, WriteRecord, WriteResult};

/// Record-level change applied by one commit.
#[derive(Clone, Copy)]
enum Change<'a> {
    Create(&'a [u8]),
    Update(&'a [u8]),
    Put(&'a [u8]),
    Delete,
}

impl<'a> Change<'a> {
    fn value(self) -> Option<&'a [u8]> {
        match self {
            Self::Create(v) | Self::Update(v) | Self::Put(v) => Some(v),
            Self::Delete => None,
        }
    }
}

/// Per-identity record repositories.
///
/// Every write validates the record against the published lexicon catalog,
/// builds the new tree inside one delta session, and appends a signed commit
/// whose head swap is the only point at which the change becomes visible.
pub struct RepoService {
    pub(crate) config: RepoConfig,
    pub(crate) blocks: Arc<dyn BlockStore>,
    pub(crate) identities: Arc<IdentityMap>,
    pub(crate) chain: CommitChain,
    lexicons: CatalogHandle,
}

impl RepoService {
    pub fn new(
        config: RepoConfig,
        blocks: Arc<dyn BlockStore>,
        identities: Arc<dyn IdentityTable>,
        heads: Arc<dyn HeadStore>,
        catalog: Catalog,
    ) -> RepoResult<Self> {
        let identities = Arc::new(IdentityMap::open(identities)?);
        let chain = CommitChain::new(Arc::clone(&blocks), heads, Arc::clone(&identities), config.retry);
        Ok(Self {
            config,
            blocks,
            identities,
            chain,
            lexicons: CatalogHandle::new(catalog),
        })
    }

    /// A service whose state lives only in memory.
    pub fn in_memory(config: RepoConfig, catalog: Catalog) -> RepoResult<Self> {
        Self::new(
            config,
            Arc::new(InMemoryBlockStore::new()),
            Arc::new(InMemoryIdentityTable::new()),
            Arc::new(InMemoryHeadStore::new()),
            catalog,
        )
    }

    /// Open the on-disk stores under `config.data_dir` and load the lexicon
    /// directory, if one is configured.
    pub fn open(config: RepoConfig) -> RepoResult<Self> {
        let blocks = Arc::new(FileBlockStore::open(config.blocks_dir())?);
        let table = Arc::new(FileIdentityTable::open(config.identity_log())?);
        let heads = Arc::new(FileHeadStore::open(config.heads_dir())?);
        let catalog = match &config.lexicon_dir {
            Some(dir) => Catalog::load_dir(dir)?,
            None => Catalog::new(),
        };
        info!(
            data_dir = %config.data_dir.display(),
            schemas = catalog.len(),
            "repository service opened"
        );
        Self::new(config, blocks, table, heads, catalog)
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// A context carrying the configured operation timeout.
    pub fn context(&self) -> OpContext {
        self.config.context()
    }

    pub(crate) fn shard(&self, did: &Did) -> RepoResult<ShardId> {
        self.identities.get_uid(did).map_err(|e| {
            if e.is_not_found() {
                RepoError::RepoNotFound(did.clone())
            } else {
                e.into()
            }
        })
    }

    /// The current head with a read session that sees every block it
    /// references. The head is read first: the session's generation is then
    /// at least the one that published it.
    pub(crate) fn snapshot(&self, did: &Did) -> RepoResult<Option<(Head, ReadSession)>> {
        let shard = self.shard(did)?;
        let Some(head) = self.chain.head(did)? else {
            return Ok(None);
        };
        let session = ReadSession::open(Arc::clone(&self.blocks), shard, self.config.retry)?;
        Ok(Some((head, session)))
    }

    // ---- Repositories ----

    /// Register a new identity. Fails with a conflict if it already exists.
    pub fn create_repository(&self, did: &Did) -> RepoResult<RepoInfo> {
        let _lease = self.chain.begin_write(did)?;
        if self.identities.contains(did) {
            return Err(RepoError::RepoExists(did.clone()));
        }
        let shard = self.identities.get_or_create_uid(did)?;
        info!(%did, %shard, "repository created");
        Ok(RepoInfo {
            did: did.clone(),
            shard,
            head: None,
            record_count: 0,
            stats: self.blocks.shard_stats(shard)?,
        })
    }

    pub fn get_repository(&self, did: &Did) -> RepoResult<RepoInfo> {
        let shard = self.shard(did)?;
        let (head, record_count) = match self.snapshot(did)? {
            Some((head, session)) => {
                let count = Mst::load(&session, head.data).leaves()?.len();
                (Some(head), count)
            }
            None => (None, 0),
        };
        Ok(RepoInfo {
            did: did.clone(),
            shard,
            head,
            record_count,
            stats: self.blocks.shard_stats(shard)?,
        })
    }

    pub fn has_repository(&self, did: &Did) -> bool {
        self.identities.contains(did)
    }

    /// Every known identity, sorted by DID.
    pub fn list_repositories(&self) -> Vec<(Did, ShardId)> {
        let mut all: Vec<(Did, ShardId)> = self.identities.iter().collect();
        all.sort();
        all
    }

    /// Remove the head, every block of the shard, and the identity row.
    pub fn delete_repository(&self, did: &Did, ctx: &OpContext) -> RepoResult<()> {
        let lease = self.chain.begin_write(did)?;
        let shard = self.shard(did)?;
        ctx.check()?;
        self.chain.clear(&lease)?;
        self.blocks.wipe(shard)?;
        self.identities.remove(did)?;
        info!(%did, %shard, "repository deleted");
        Ok(())
    }

    // ---- Records ----

    /// Add a record. The key defaults to a fresh TID; an existing record
    /// under the key is a conflict.
    pub fn create_record(
        &self,
        did: &Did,
        write: WriteRecord<'_>,
        signer: &dyn Signer,
        ctx: &OpContext,
    ) -> RepoResult<WriteResult> {
        let rkey = match write.rkey {
            Some(rkey) => rkey.to_string(),
            None => Tid::now().encode(),
        };
        let uri = RecordUri::new(did.clone(), RecordPath::new(write.collection, rkey)?);
        self.validate(&uri, &write)?;
        self.mutate(uri, Change::Create(write.value), signer, ctx)
    }

    /// Replace an existing record.
    pub fn update_record(
        &self,
        did: &Did,
        write: WriteRecord<'_>,
        signer: &dyn Signer,
        ctx: &OpContext,
    ) -> RepoResult<WriteResult> {
        let uri = RecordUri::new(did.clone(), keyed_path(&write)?);
        self.validate(&uri, &write)?;
        self.mutate(uri, Change::Update(write.value), signer, ctx)
    }

    /// Create or replace a record.
    pub fn put_record(
        &self,
        did: &Did,
        write: WriteRecord<'_>,
        signer: &dyn Signer,
        ctx: &OpContext,
    ) -> RepoResult<WriteResult> {
        let uri = RecordUri::new(did.clone(), keyed_path(&write)?);
        self.validate(&uri, &write)?;
        self.mutate(uri, Change::Put(write.value), signer, ctx)
    }

    pub fn delete_record(
        &self,
        did: &Did,
        collection: &str,
        rkey: &str,
        signer: &dyn Signer,
        ctx: &OpContext,
    ) -> RepoResult<WriteResult> {
        let uri = RecordUri::new(did.clone(), RecordPath::new(collection, rkey)?);
        self.mutate(uri, Change::Delete, signer, ctx)
    }

    /// Size-check the value, then validate it unless the write opted out.
    fn validate(&self, uri: &RecordUri, write: &WriteRecord<'_>) -> RepoResult<()> {
        let limit = self.config.record_limit();
        if write.value.len() > limit {
            return Err(RepoError::RecordTooLarge {
                uri: uri.clone(),
                size: write.value.len(),
                limit,
            });
        }
        if !write.validate {
            return Ok(());
        }
        let catalog = self.lexicons.snapshot();
        let declared = write.effective_type();
        if let Err(e) = catalog.resolve(declared) {
            if e.is_not_found() {
                return Err(RepoError::SchemaNotFound {
                    uri: uri.clone(),
                    schema: declared.to_string(),
                });
            }
        }
        validate_record_bytes(&catalog, write.value, declared, self.config.validation.flags()).map_err(
            |source| RepoError::Validation {
                uri: uri.clone(),
                declared_type: declared.to_string(),
                source,
            },
        )
    }

    fn mutate(
        &self,
        uri: RecordUri,
        change: Change<'_>,
        signer: &dyn Signer,
        ctx: &OpContext,
    ) -> RepoResult<WriteResult> {
        ctx.check()?;
        let did = &uri.did;
        // The shard is resolved under the lease so a concurrent delete cannot
        // wipe it between the lookup and the head swap.
        let lease = self.chain.begin_write(did)?;
        let shard = self.identities.get_or_create_uid(did)?;
        let head = self.chain.head(did)?;
        let key = uri.path.to_key();

        let mut delta = DeltaSession::new(Arc::clone(&self.blocks), shard, self.config.retry);
        let cid = change.value().map(|v| delta.put(v.to_vec()));
        let root = {
            let mut tree = match &head {
                Some(head) => Mst::load(&mut delta, head.data),
                None => Mst::create(&mut delta)?,
            };
            match (change, tree.get(&key)?) {
                (Change::Create(_), Some(_)) => return Err(RepoError::RecordExists(uri)),
                (Change::Update(_) | Change::Delete, None) => return Err(RepoError::RecordNotFound(uri)),
                _ => {}
            }
            match cid {
                Some(cid) => tree.insert(&key, cid)?,
                None => tree.delete(&key)?,
            }
        };

        ctx.check()?;
        let expected = head.as_ref().map(|h| h.commit);
        let entry = self.chain.append(&lease, expected, root, delta, signer, ctx)?;
        debug!(%uri, commit = %entry.id, "record written");
        Ok(WriteResult {
            cid,
            commit: entry.id,
            version: entry.commit.version(),
            rev: entry.commit.rev(),
            uri,
        })
    }

    pub fn get_record(&self, did: &Did, collection: &str, rkey: &str) -> RepoResult<Record> {
        let uri = RecordUri::new(did.clone(), RecordPath::new(collection, rkey)?);
        let Some((head, session)) = self.snapshot(did)? else {
            return Err(RepoError::RecordNotFound(uri));
        };
        let Some(cid) = Mst::load(&session, head.data).get(&uri.path.to_key())? else {
            return Err(RepoError::RecordNotFound(uri));
        };
        let value = session.require(&cid)?;
        Ok(Record { uri, cid, value })
    }

    /// Read a record as it stood at an earlier commit of the chain.
    pub fn get_record_at(&self, did: &Did, commit: &BlockId, collection: &str, rkey: &str) -> RepoResult<Record> {
        let uri = RecordUri::new(did.clone(), RecordPath::new(collection, rkey)?);
        let shard = self.shard(did)?;
        let entry = self.chain.get_commit(did, commit)?;
        let session = ReadSession::open(Arc::clone(&self.blocks), shard, self.config.retry)?;
        let root = entry.commit.data();
        if session.get(&root)?.is_none() {
            return Err(RepoError::TreeCompacted {
                did: did.clone(),
                commit: *commit,
            });
        }
        let Some(cid) = Mst::load(&session, root).get(&uri.path.to_key())? else {
            return Err(RepoError::RecordNotFound(uri));
        };
        let value = session.require(&cid)?;
        Ok(Record { uri, cid, value })
    }

    /// Records of one collection in key order, resuming after the `cursor`
    /// record key.
    pub fn list_records(
        &self,
        did: &Did,
        collection: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> RepoResult<RecordPage> {
        if !is_valid_nsid(collection) {
            return Err(TypeError::InvalidCollection(collection.to_string()).into());
        }
        let Some((head, session)) = self.snapshot(did)? else {
            return Ok(RecordPage::default());
        };
        let prefix = RecordPath::collection_prefix(collection);
        let after = cursor.map(|rkey| format!("{prefix}{rkey}"));
        let page = Mst::load(&session, head.data).enumerate(&prefix, after.as_deref(), limit)?;

        let mut records = Vec::with_capacity(page.entries.len());
        for (key, cid) in page.entries {
            let path = RecordPath::parse(&key)?;
            let value = session.require(&cid)?;
            records.push(Record {
                uri: RecordUri::new(did.clone(), path),
                cid,
                value,
            });
        }
        let cursor = page
            .cursor
            .map(|key| RecordPath::parse(&key).map(|p| p.rkey().to_string()))
            .transpose()?;
        Ok(RecordPage { records, cursor })
    }

    // ---- Commits ----

    pub fn get_commit(&self, did: &Did, id: &BlockId) -> RepoResult<CommitEntry> {
        self.shard(did)?;
        Ok(self.chain.get_commit(did, id)?)
    }

    /// Commits newest first; `cursor` is the version of the last commit of
    /// the previous page.
    pub fn list_commits(&self, did: &Did, limit: usize, cursor: Option<u64>) -> RepoResult<CommitPage> {
        self.shard(did)?;
        Ok(self.chain.list_commits(did, limit, cursor)?)
    }

    /// Check the head commit's signature against `key` and that it publishes
    /// the tree the head points at.
    pub fn verify_head(&self, did: &Did, key: &VerifyingKey) -> RepoResult<CommitEntry> {
        self.shard(did)?;
        let head = self
            .chain
            .head(did)?
            .ok_or_else(|| CommitError::NoHead(did.clone()))?;
        let entry = self.chain.get_commit(did, &head.commit)?;
        entry.commit.verify(key)?;
        if entry.commit.data() != head.data || entry.commit.version() != head.version {
            return Err(CommitError::Inconsistent {
                did: did.clone(),
                version: entry.commit.version(),
                reason: "head pointer disagrees with its commit".into(),
            }
            .into());
        }
        Ok(entry)
    }

    /// Verify the whole chain and that every node and record of the head
    /// tree is present. Returns the number of commits.
    pub fn verify_repository(&self, did: &Did, ctx: &OpContext) -> RepoResult<usize> {
        let commits = self.chain.verify_chain(did, ctx)?;
        if let Some((head, session)) = self.snapshot(did)? {
            let tree = Mst::load(&session, head.data);
            tree.node_ids()?;
            for (_, cid) in tree.leaves()? {
                ctx.check()?;
                session.require(&cid)?;
            }
        }
        Ok(commits)
    }

    // ---- Lexicons ----

    /// The catalog validations currently run against.
    pub fn catalog(&self) -> Arc<Catalog> {
        self.lexicons.snapshot()
    }

    /// Rebuild the catalog from `dir` and publish it. Validations already
    /// running keep the catalog they started with.
    pub fn reload_lexicons(&self, dir: impl AsRef<Path>) -> RepoResult<Arc<Catalog>> {
        Ok(self.lexicons.reload(dir)?)
    }
}

fn keyed_path(write: &WriteRecord<'_>) -> RepoResult<RecordPath> {
    let rkey = write
        .rkey
        .ok_or_else(|| TypeError::InvalidRecordKey(String::new()))?;
    Ok(RecordPath::new(write.collection, rkey)?)
}

impl std::fmt::Debug for RepoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoService")
            .field("data_dir", &self.config.data_dir)
            .field("identities", &self.identities.len())
            .finish()
    }
}
