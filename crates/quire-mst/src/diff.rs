use std::collections::{BTreeMap, HashMap, HashSet};

use quire_store::BlockSource;
use quire_types::BlockId;
use tracing::debug;

use crate::error::MstResult;
use crate::node::Entry;
use crate::tree::{load_entries, node_layer};

/// Difference between two trees.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeDiff {
    /// Keys only in the newer tree, with their values.
    pub created: Vec<(String, BlockId)>,
    /// Keys in both trees whose value changed: `(key, old, new)`.
    pub updated: Vec<(String, BlockId, BlockId)>,
    /// Keys only in the older tree, with their former values.
    pub deleted: Vec<(String, BlockId)>,
    /// Nodes of the newer tree absent from the older one.
    pub new_nodes: Vec<BlockId>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Values referenced by created or updated keys.
    pub fn new_values(&self) -> impl Iterator<Item = &BlockId> {
        self.created
            .iter()
            .map(|(_, v)| v)
            .chain(self.updated.iter().map(|(_, _, v)| v))
    }
}

/// Nodes still to expand, bucketed by layer.
#[derive(Default)]
struct Frontier {
    layers: BTreeMap<u32, HashSet<BlockId>>,
}

impl Frontier {
    fn push(&mut self, layer: u32, id: BlockId) {
        self.layers.entry(layer).or_default().insert(id);
    }

    fn top(&self) -> Option<u32> {
        self.layers.keys().next_back().copied()
    }

    fn take(&mut self, layer: u32) -> HashSet<BlockId> {
        self.layers.remove(&layer).unwrap_or_default()
    }
}

/// Compare the tree at `from` (or an empty tree) with the tree at `to`.
///
/// Both trees are walked one layer at a time from the top. A node address
/// reached on the same layer from both sides holds the same keys, so it is
/// skipped without being loaded.
pub fn diff<S: BlockSource + ?Sized>(store: &S, from: Option<BlockId>, to: BlockId) -> MstResult<TreeDiff> {
    let mut old_side = Frontier::default();
    let mut new_side = Frontier::default();
    if let Some(from) = from {
        let entries = load_entries(store, &from)?;
        old_side.push(node_layer(store, &entries)?, from);
    }
    let entries = load_entries(store, &to)?;
    new_side.push(node_layer(store, &entries)?, to);

    let mut old_leaves: HashMap<String, BlockId> = HashMap::new();
    let mut new_leaves: HashMap<String, BlockId> = HashMap::new();
    let mut new_nodes = Vec::new();

    while let Some(layer) = old_side.top().max(new_side.top()) {
        let olds = old_side.take(layer);
        let news = new_side.take(layer);

        for id in olds.difference(&news) {
            expand(store, id, layer, &mut old_side, &mut old_leaves)?;
        }
        for id in news.difference(&olds) {
            expand(store, id, layer, &mut new_side, &mut new_leaves)?;
            new_nodes.push(*id);
        }
    }

    let mut out = TreeDiff {
        new_nodes,
        ..TreeDiff::default()
    };
    for (key, value) in &new_leaves {
        match old_leaves.get(key) {
            None => out.created.push((key.clone(), *value)),
            Some(old) if old != value => out.updated.push((key.clone(), *old, *value)),
            Some(_) => {}
        }
    }
    for (key, value) in old_leaves {
        if !new_leaves.contains_key(&key) {
            out.deleted.push((key, value));
        }
    }
    out.created.sort();
    out.updated.sort();
    out.deleted.sort();
    out.new_nodes.sort();

    debug!(
        created = out.created.len(),
        updated = out.updated.len(),
        deleted = out.deleted.len(),
        new_nodes = out.new_nodes.len(),
        "tree diff computed"
    );
    Ok(out)
}

fn expand<S: BlockSource + ?Sized>(
    store: &S,
    id: &BlockId,
    layer: u32,
    frontier: &mut Frontier,
    leaves: &mut HashMap<String, BlockId>,
) -> MstResult<()> {
    for entry in load_entries(store, id)? {
        match entry {
            Entry::Leaf { key, value } => {
                leaves.insert(key, value);
            }
            Entry::Tree(child) => {
                let below = layer.checked_sub(1).ok_or_else(|| crate::MstError::InvalidNode {
                    id: *id,
                    reason: "subtree below layer zero".into(),
                })?;
                frontier.push(below, child);
            }
        }
    }
    Ok(())
}
