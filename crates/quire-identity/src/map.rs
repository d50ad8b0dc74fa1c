use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use quire_types::{Did, ShardId};
use tracing::{debug, info};

use crate::error::{IdentityError, IdentityResult};
use crate::table::{IdentityRow, IdentityTable, TableSnapshot};

const FIRST_SHARD: ShardId = ShardId::new(1);

struct Cache {
    by_did: HashMap<Did, ShardId>,
    by_uid: HashMap<ShardId, Did>,
    next_uid: ShardId,
}

impl Cache {
    fn from_snapshot(snapshot: TableSnapshot) -> Self {
        let next_uid = snapshot
            .high_water
            .into_iter()
            .chain(snapshot.rows.iter().map(|r| r.uid))
            .max()
            .map(ShardId::next)
            .unwrap_or(FIRST_SHARD);
        let mut by_did = HashMap::with_capacity(snapshot.rows.len());
        let mut by_uid = HashMap::with_capacity(snapshot.rows.len());
        for row in snapshot.rows {
            by_uid.insert(row.uid, row.did.clone());
            by_did.insert(row.did, row.uid);
        }
        Self {
            by_did,
            by_uid,
            next_uid,
        }
    }
}

/// Cached, race-safe `Did <-> ShardId` mapping.
///
/// Lookups take a shared lock. Creation takes the exclusive lock, checks the
/// cache again, persists the row and only then updates the cache, so every
/// concurrent caller for one DID observes the same shard and exactly one row
/// is persisted.
pub struct IdentityMap {
    table: Arc<dyn IdentityTable>,
    cache: RwLock<Cache>,
}

impl IdentityMap {
    /// Build the cache from the table's persisted rows.
    pub fn open(table: Arc<dyn IdentityTable>) -> IdentityResult<Self> {
        let snapshot = table.load()?;
        let cache = Cache::from_snapshot(snapshot);
        debug!(identities = cache.by_did.len(), next_uid = %cache.next_uid, "identity map loaded");
        Ok(Self {
            table,
            cache: RwLock::new(cache),
        })
    }

    /// Return the DID's shard, allocating one on first use.
    pub fn get_or_create_uid(&self, did: &Did) -> IdentityResult<ShardId> {
        if let Some(uid) = self.cache.read().expect("lock poisoned").by_did.get(did) {
            return Ok(*uid);
        }

        let mut cache = self.cache.write().expect("lock poisoned");
        if let Some(uid) = cache.by_did.get(did) {
            return Ok(*uid);
        }
        let uid = cache.next_uid;
        self.table.insert(&IdentityRow {
            did: did.clone(),
            uid,
        })?;
        cache.by_did.insert(did.clone(), uid);
        cache.by_uid.insert(uid, did.clone());
        cache.next_uid = uid.next();
        info!(%did, %uid, "identity mapped");
        Ok(uid)
    }

    pub fn get_uid(&self, did: &Did) -> IdentityResult<ShardId> {
        self.cache
            .read()
            .expect("lock poisoned")
            .by_did
            .get(did)
            .copied()
            .ok_or_else(|| IdentityError::UnknownIdentity(did.clone()))
    }

    pub fn get_did(&self, uid: ShardId) -> IdentityResult<Did> {
        self.cache
            .read()
            .expect("lock poisoned")
            .by_uid
            .get(&uid)
            .cloned()
            .ok_or(IdentityError::UnknownShard(uid))
    }

    pub fn contains(&self, did: &Did) -> bool {
        self.cache
            .read()
            .expect("lock poisoned")
            .by_did
            .contains_key(did)
    }

    /// Remove the DID's mapping. Its shard id is never handed out again.
    pub fn remove(&self, did: &Did) -> IdentityResult<ShardId> {
        let mut cache = self.cache.write().expect("lock poisoned");
        let uid = cache
            .by_did
            .get(did)
            .copied()
            .ok_or_else(|| IdentityError::UnknownIdentity(did.clone()))?;
        self.table.tombstone(&IdentityRow {
            did: did.clone(),
            uid,
        })?;
        cache.by_did.remove(did);
        cache.by_uid.remove(&uid);
        info!(%did, %uid, "identity removed");
        Ok(uid)
    }

    /// Rebuild the cache from the table, picking up rows persisted by a
    /// writer that failed before updating its cache.
    pub fn reload(&self) -> IdentityResult<()> {
        let snapshot = self.table.load()?;
        let mut cache = self.cache.write().expect("lock poisoned");
        let fresh = Cache::from_snapshot(snapshot);
        // Never move the allocator backwards.
        let next_uid = fresh.next_uid.max(cache.next_uid);
        *cache = Cache { next_uid, ..fresh };
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cache.read().expect("lock poisoned").by_did.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every live mapping, ordered by shard id.
    pub fn iter(&self) -> impl Iterator<Item = (Did, ShardId)> {
        let cache = self.cache.read().expect("lock poisoned");
        let mut all: Vec<(Did, ShardId)> = cache
            .by_did
            .iter()
            .map(|(did, uid)| (did.clone(), *uid))
            .collect();
        all.sort_by_key(|(_, uid)| *uid);
        all.into_iter()
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("identities", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{FileIdentityTable, InMemoryIdentityTable};
    use std::thread;

    fn did(s: &str) -> Did {
        Did::new(s).unwrap()
    }

    fn memory_map() -> (Arc<InMemoryIdentityTable>, IdentityMap) {
        let table = Arc::new(InMemoryIdentityTable::new());
        let map = IdentityMap::open(Arc::clone(&table) as Arc<dyn IdentityTable>).unwrap();
        (table, map)
    }

    // -----------------------------------------------------------------------
    // Allocation and lookup
    // -----------------------------------------------------------------------

    #[test]
    fn allocation_is_idempotent() {
        let (table, map) = memory_map();
        let a = map.get_or_create_uid(&did("did:plc:alice")).unwrap();
        let again = map.get_or_create_uid(&did("did:plc:alice")).unwrap();
        let b = map.get_or_create_uid(&did("did:plc:bob")).unwrap();
        assert_eq!(a, again);
        assert_eq!(a, ShardId::new(1));
        assert_eq!(b, ShardId::new(2));
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn lookups_both_directions() {
        let (_, map) = memory_map();
        let uid = map.get_or_create_uid(&did("did:plc:alice")).unwrap();
        assert_eq!(map.get_uid(&did("did:plc:alice")).unwrap(), uid);
        assert_eq!(map.get_did(uid).unwrap(), did("did:plc:alice"));
        assert!(map.get_uid(&did("did:plc:nobody")).unwrap_err().is_not_found());
        assert!(map.get_did(ShardId::new(99)).unwrap_err().is_not_found());
    }

    #[test]
    fn removed_uids_are_never_reused() {
        let (_, map) = memory_map();
        let first = map.get_or_create_uid(&did("did:plc:alice")).unwrap();
        map.remove(&did("did:plc:alice")).unwrap();
        assert!(!map.contains(&did("did:plc:alice")));
        let second = map.get_or_create_uid(&did("did:plc:alice")).unwrap();
        assert_ne!(first, second);
        assert!(map.remove(&did("did:plc:ghost")).is_err());
    }

    #[test]
    fn iter_orders_by_uid() {
        let (_, map) = memory_map();
        for name in ["did:plc:c", "did:plc:a", "did:plc:b"] {
            map.get_or_create_uid(&did(name)).unwrap();
        }
        let order: Vec<String> = map.iter().map(|(d, _)| d.into_string()).collect();
        assert_eq!(order, vec!["did:plc:c", "did:plc:a", "did:plc:b"]);
        assert_eq!(map.len(), 3);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_creation_yields_one_row() {
        let (table, map) = memory_map();
        let map = Arc::new(map);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let map = Arc::clone(&map);
                thread::spawn(move || map.get_or_create_uid(&did("did:example:abc")).unwrap())
            })
            .collect();
        let uids: Vec<ShardId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(uids.iter().all(|u| *u == uids[0]));
        assert_eq!(table.row_count(), 1);
    }

    // -----------------------------------------------------------------------
    // Persistence and reconciliation
    // -----------------------------------------------------------------------

    #[test]
    fn mappings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.log");
        let uid = {
            let table = Arc::new(FileIdentityTable::open(&path).unwrap());
            let map = IdentityMap::open(table).unwrap();
            map.get_or_create_uid(&did("did:plc:bob")).unwrap();
            map.get_or_create_uid(&did("did:plc:alice")).unwrap()
        };
        let table = Arc::new(FileIdentityTable::open(&path).unwrap());
        let map = IdentityMap::open(table).unwrap();
        assert_eq!(map.get_uid(&did("did:plc:alice")).unwrap(), uid);
        assert_eq!(
            map.get_or_create_uid(&did("did:plc:carol")).unwrap(),
            ShardId::new(3)
        );
    }

    #[test]
    fn reload_picks_up_rows_missing_from_cache() {
        let (table, map) = memory_map();
        map.get_or_create_uid(&did("did:plc:alice")).unwrap();
        // A row that reached the table without reaching this cache.
        table
            .insert(&IdentityRow {
                did: did("did:plc:orphan"),
                uid: ShardId::new(2),
            })
            .unwrap();
        assert!(map.get_uid(&did("did:plc:orphan")).is_err());

        map.reload().unwrap();
        assert_eq!(map.get_uid(&did("did:plc:orphan")).unwrap(), ShardId::new(2));
        assert_eq!(
            map.get_or_create_uid(&did("did:plc:new")).unwrap(),
            ShardId::new(3)
        );
    }
}
