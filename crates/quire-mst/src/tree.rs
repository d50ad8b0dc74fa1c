use std::collections::{HashSet, VecDeque};

use quire_store::{BlockSink, BlockSource};
use quire_types::BlockId;
use tracing::trace;

use crate::error::{MstError, MstResult};
use crate::node::{find_gte_leaf, layer_for_key, validate_key, Entry, NodeData};

/// A page of entries from [`Mst::enumerate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub entries: Vec<(String, BlockId)>,
    /// Last key returned when the page was cut short by the limit. Pass it
    /// back to resume.
    pub cursor: Option<String>,
}

/// Merkle Search Tree rooted at one node address.
///
/// `S` supplies node blocks; mutating operations additionally need it to be
/// a [`BlockSink`]. Mutations replace the root in place and return it; the
/// previous root stays readable from the same store.
pub struct Mst<S> {
    store: S,
    root: BlockId,
}

impl<S: BlockSource> Mst<S> {
    /// Open the tree rooted at `root`.
    pub fn load(store: S, root: BlockId) -> Self {
        Self { store, root }
    }

    pub fn root(&self) -> BlockId {
        self.root
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub(crate) fn load_node(&self, id: &BlockId) -> MstResult<Vec<Entry>> {
        load_entries(&self.store, id)
    }

    fn node_layer(&self, entries: &[Entry]) -> MstResult<u32> {
        node_layer(&self.store, entries)
    }

    pub fn get(&self, key: &str) -> MstResult<Option<BlockId>> {
        validate_key(key)?;
        let mut entries = self.load_node(&self.root)?;
        loop {
            let index = find_gte_leaf(&entries, key);
            if let Some(Entry::Leaf { key: k, value }) = entries.get(index) {
                if k == key {
                    return Ok(Some(*value));
                }
            }
            match index.checked_sub(1).and_then(|i| entries.get(i)) {
                Some(Entry::Tree(child)) => entries = self.load_node(child)?,
                _ => return Ok(None),
            }
        }
    }

    /// Up to `limit` entries whose keys start with `prefix` and sort after
    /// `cursor`, in key order.
    pub fn enumerate(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> MstResult<Page> {
        let mut page = Page::default();
        if limit == 0 {
            return Ok(page);
        }
        let lower = match cursor {
            Some(c) if c > prefix => c,
            _ => prefix,
        };
        let mut full = false;
        self.walk_from(&self.root, lower, &mut |key: &str, value: BlockId| {
            if cursor.is_some_and(|c| key <= c) {
                return true;
            }
            if !key.starts_with(prefix) {
                // Keys sharing a prefix are contiguous; anything past it ends the scan.
                return key < prefix;
            }
            page.entries.push((key.to_string(), value));
            if page.entries.len() == limit {
                full = true;
                return false;
            }
            true
        })?;
        if full {
            page.cursor = page.entries.last().map(|(k, _)| k.clone());
        }
        Ok(page)
    }

    /// In-order walk over every leaf with key `>= lower`. Stops early when
    /// `visit` returns false; returns whether the walk ran to completion.
    fn walk_from(
        &self,
        node: &BlockId,
        lower: &str,
        visit: &mut dyn FnMut(&str, BlockId) -> bool,
    ) -> MstResult<bool> {
        let entries = self.load_node(node)?;
        let index = find_gte_leaf(&entries, lower);
        let start = match index.checked_sub(1).and_then(|i| entries.get(i)) {
            Some(Entry::Tree(_)) => index - 1,
            _ => index,
        };
        for entry in &entries[start..] {
            let keep_going = match entry {
                Entry::Leaf { key, value } => visit(key, *value),
                Entry::Tree(child) => self.walk_from(child, lower, visit)?,
            };
            if !keep_going {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Every `(key, value)` pair in key order.
    pub fn leaves(&self) -> MstResult<Vec<(String, BlockId)>> {
        let mut out = Vec::new();
        self.walk_from(&self.root, "", &mut |key: &str, value: BlockId| {
            out.push((key.to_string(), value));
            true
        })?;
        Ok(out)
    }

    /// Address of every node reachable from the root, root first.
    pub fn node_ids(&self) -> MstResult<Vec<BlockId>> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([self.root]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            for entry in self.load_node(&id)? {
                if let Entry::Tree(child) = entry {
                    queue.push_back(child);
                }
            }
        }
        Ok(order)
    }
}

impl<S: BlockSink> Mst<S> {
    /// Create an empty tree, writing its root node.
    pub fn create(mut store: S) -> MstResult<Self> {
        let root = store.write_block(NodeData::default().encode()?);
        Ok(Self { store, root })
    }

    /// Insert or replace `key`. Returns the new root.
    pub fn insert(&mut self, key: &str, value: BlockId) -> MstResult<BlockId> {
        validate_key(key)?;
        let entries = self.load_node(&self.root)?;
        let layer = self.node_layer(&entries)?;
        let updated = self.add(entries, layer, key, value)?;
        self.root = self.store_node(updated)?;
        trace!(key, root = %self.root, "tree insert");
        Ok(self.root)
    }

    /// Replace the value of an existing key.
    pub fn update(&mut self, key: &str, value: BlockId) -> MstResult<BlockId> {
        if self.get(key)?.is_none() {
            return Err(MstError::KeyNotFound(key.to_string()));
        }
        self.insert(key, value)
    }

    /// Remove an existing key. Returns the new root.
    pub fn delete(&mut self, key: &str) -> MstResult<BlockId> {
        validate_key(key)?;
        let entries = self.load_node(&self.root)?;
        let layer = self.node_layer(&entries)?;
        let mut remaining = self.remove(entries, layer, key)?;

        // A root holding nothing but one subtree collapses into that subtree.
        let root = loop {
            match remaining.as_slice() {
                [Entry::Tree(only)] => {
                    let only = *only;
                    let below = self.load_node(&only)?;
                    if matches!(below.as_slice(), [Entry::Tree(_)]) {
                        remaining = below;
                    } else {
                        break only;
                    }
                }
                _ => break self.store_node(remaining)?,
            }
        };
        self.root = root;
        trace!(key, root = %self.root, "tree delete");
        Ok(self.root)
    }

    fn store_node(&mut self, entries: Vec<Entry>) -> MstResult<BlockId> {
        let bytes = NodeData::new(entries).encode()?;
        Ok(self.store.write_block(bytes))
    }

    /// Entries of a node at `layer` after adding `key`. The node itself is
    /// not written; every new descendant is.
    fn add(&mut self, mut entries: Vec<Entry>, layer: u32, key: &str, value: BlockId) -> MstResult<Vec<Entry>> {
        let key_layer = layer_for_key(key);
        let leaf = Entry::Leaf {
            key: key.to_string(),
            value,
        };
        let index = find_gte_leaf(&entries, key);

        if key_layer == layer {
            if let Some(Entry::Leaf { key: k, .. }) = entries.get(index) {
                if k == key {
                    entries[index] = leaf;
                    return Ok(entries);
                }
            }
            match index.checked_sub(1).map(|i| entries[i].clone()) {
                Some(Entry::Tree(child)) => {
                    let (left, right) = self.split_node(&child, child_layer(&child, layer)?, key)?;
                    let mut replacement = Vec::with_capacity(3);
                    replacement.extend(left.map(Entry::Tree));
                    replacement.push(leaf);
                    replacement.extend(right.map(Entry::Tree));
                    entries.splice(index - 1..index, replacement);
                }
                _ => entries.insert(index, leaf),
            }
            Ok(entries)
        } else if key_layer < layer {
            let below = child_layer(&self.root, layer)?;
            match index.checked_sub(1).map(|i| entries[i].clone()) {
                Some(Entry::Tree(child)) => {
                    let child_entries = self.load_node(&child)?;
                    let updated = self.add(child_entries, below, key, value)?;
                    entries[index - 1] = Entry::Tree(self.store_node(updated)?);
                }
                _ => {
                    let created = self.add(Vec::new(), below, key, value)?;
                    entries.insert(index, Entry::Tree(self.store_node(created)?));
                }
            }
            Ok(entries)
        } else {
            let (mut left, mut right) = self.split_entries(entries, layer, key)?;
            for _ in 1..(key_layer - layer) {
                if let Some(id) = left {
                    left = Some(self.store_node(vec![Entry::Tree(id)])?);
                }
                if let Some(id) = right {
                    right = Some(self.store_node(vec![Entry::Tree(id)])?);
                }
            }
            let mut root = Vec::with_capacity(3);
            root.extend(left.map(Entry::Tree));
            root.push(leaf);
            root.extend(right.map(Entry::Tree));
            Ok(root)
        }
    }

    fn split_node(
        &mut self,
        node: &BlockId,
        layer: u32,
        key: &str,
    ) -> MstResult<(Option<BlockId>, Option<BlockId>)> {
        let entries = self.load_node(node)?;
        self.split_entries(entries, layer, key)
    }

    /// Split a node's entries into stored halves holding the keys below and
    /// above `key`. Empty halves are `None`.
    fn split_entries(
        &mut self,
        mut entries: Vec<Entry>,
        layer: u32,
        key: &str,
    ) -> MstResult<(Option<BlockId>, Option<BlockId>)> {
        let index = find_gte_leaf(&entries, key);
        let mut right = entries.split_off(index);
        let mut left = entries;

        if let Some(Entry::Tree(last)) = left.last().cloned() {
            left.pop();
            let (sub_left, sub_right) = self.split_node(&last, child_layer(&last, layer)?, key)?;
            left.extend(sub_left.map(Entry::Tree));
            if let Some(id) = sub_right {
                right.insert(0, Entry::Tree(id));
            }
        }

        let left = if left.is_empty() {
            None
        } else {
            Some(self.store_node(left)?)
        };
        let right = if right.is_empty() {
            None
        } else {
            Some(self.store_node(right)?)
        };
        Ok((left, right))
    }

    /// Entries of a node at `layer` after removing `key`.
    fn remove(&mut self, mut entries: Vec<Entry>, layer: u32, key: &str) -> MstResult<Vec<Entry>> {
        let index = find_gte_leaf(&entries, key);

        if let Some(Entry::Leaf { key: k, .. }) = entries.get(index) {
            if k == key {
                let prev = index.checked_sub(1).map(|i| entries[i].clone());
                let next = entries.get(index + 1).cloned();
                match (prev, next) {
                    (Some(Entry::Tree(left)), Some(Entry::Tree(right))) => {
                        let merged = self.merge_nodes(&left, &right, child_layer(&left, layer)?)?;
                        entries.splice(index - 1..=index + 1, [Entry::Tree(merged)]);
                    }
                    _ => {
                        entries.remove(index);
                    }
                }
                return Ok(entries);
            }
        }

        match index.checked_sub(1).map(|i| entries[i].clone()) {
            Some(Entry::Tree(child)) => {
                let child_entries = self.load_node(&child)?;
                let updated = self.remove(child_entries, child_layer(&child, layer)?, key)?;
                if updated.is_empty() {
                    entries.remove(index - 1);
                } else {
                    entries[index - 1] = Entry::Tree(self.store_node(updated)?);
                }
                Ok(entries)
            }
            _ => Err(MstError::KeyNotFound(key.to_string())),
        }
    }

    /// Concatenate two adjacent sibling nodes, merging the subtrees that meet
    /// at the seam.
    fn merge_nodes(&mut self, left: &BlockId, right: &BlockId, layer: u32) -> MstResult<BlockId> {
        let mut left_entries = self.load_node(left)?;
        let mut right_entries = self.load_node(right)?;

        if let (Some(Entry::Tree(a)), Some(Entry::Tree(b))) =
            (left_entries.last().cloned(), right_entries.first().cloned())
        {
            let merged = self.merge_nodes(&a, &b, child_layer(&a, layer)?)?;
            left_entries.pop();
            right_entries.remove(0);
            left_entries.push(Entry::Tree(merged));
        }
        left_entries.extend(right_entries);
        self.store_node(left_entries)
    }
}

impl<S> std::fmt::Debug for Mst<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mst").field("root", &self.root).finish()
    }
}

pub(crate) fn load_entries<S: BlockSource + ?Sized>(store: &S, id: &BlockId) -> MstResult<Vec<Entry>> {
    let bytes = store.read_block(id)?.ok_or(MstError::MissingNode(*id))?;
    Ok(NodeData::decode(*id, &bytes)?.entries)
}

/// Layer of a node, derived from its first leaf or, failing that, from its
/// first subtree. An empty node is on layer zero.
pub(crate) fn node_layer<S: BlockSource + ?Sized>(store: &S, entries: &[Entry]) -> MstResult<u32> {
    let mut entries = entries.to_vec();
    let mut depth = 0;
    loop {
        if let Some(key) = entries.iter().find_map(|e| match e {
            Entry::Leaf { key, .. } => Some(key),
            Entry::Tree(_) => None,
        }) {
            return Ok(layer_for_key(key) + depth);
        }
        match entries.first() {
            Some(Entry::Tree(child)) => {
                entries = load_entries(store, child)?;
                depth += 1;
            }
            _ => return Ok(depth),
        }
    }
}

/// Layer of the children of a node at `layer`. Layer-zero nodes have none.
fn child_layer(node: &BlockId, layer: u32) -> MstResult<u32> {
    layer.checked_sub(1).ok_or_else(|| MstError::InvalidNode {
        id: *node,
        reason: "subtree below layer zero".into(),
    })
}
