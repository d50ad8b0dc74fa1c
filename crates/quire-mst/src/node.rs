use quire_crypto::ContentHasher;
use quire_types::BlockId;
use serde::{Deserialize, Serialize};

use crate::error::{MstError, MstResult};

/// Longest key the tree accepts.
pub const MAX_KEY_LEN: usize = 1024;

/// One slot of a tree node.
///
/// Entries are interleaved: a `Tree` entry holds every key that sorts
/// between its neighbouring leaves, and two `Tree` entries are never
/// adjacent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entry {
    Leaf { key: String, value: BlockId },
    Tree(BlockId),
}

/// Encoded form of a tree node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    pub entries: Vec<Entry>,
}

impl NodeData {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn encode(&self) -> MstResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| MstError::Encoding(e.to_string()))
    }

    /// Decode and check the structural rules of a node.
    pub fn decode(id: BlockId, bytes: &[u8]) -> MstResult<Self> {
        let node: Self = bincode::deserialize(bytes).map_err(|e| MstError::InvalidNode {
            id,
            reason: e.to_string(),
        })?;
        let mut prev_key: Option<&str> = None;
        let mut prev_was_tree = false;
        for entry in &node.entries {
            match entry {
                Entry::Leaf { key, .. } => {
                    if prev_key.is_some_and(|p| p >= key.as_str()) {
                        return Err(MstError::InvalidNode {
                            id,
                            reason: format!("keys out of order at {key:?}"),
                        });
                    }
                    prev_key = Some(key.as_str());
                    prev_was_tree = false;
                }
                Entry::Tree(_) => {
                    if prev_was_tree {
                        return Err(MstError::InvalidNode {
                            id,
                            reason: "adjacent subtrees".into(),
                        });
                    }
                    prev_was_tree = true;
                }
            }
        }
        Ok(node)
    }

    /// Address of the node holding no entries: the root of an empty tree.
    pub fn empty_id() -> BlockId {
        // bincode of an empty Vec is its u64 length prefix.
        ContentHasher::BLOCK.hash(&0u64.to_le_bytes())
    }

    pub fn first_leaf_key(&self) -> Option<&str> {
        self.entries.iter().find_map(|e| match e {
            Entry::Leaf { key, .. } => Some(key.as_str()),
            Entry::Tree(_) => None,
        })
    }
}

/// Index of the first leaf whose key is `>= key`, or `entries.len()`.
pub(crate) fn find_gte_leaf(entries: &[Entry], key: &str) -> usize {
    entries
        .iter()
        .position(|e| matches!(e, Entry::Leaf { key: k, .. } if k.as_str() >= key))
        .unwrap_or(entries.len())
}

/// Layer of a key: half the leading zero bits of its BLAKE3 hash, giving a
/// fan-out of about four.
pub fn layer_for_key(key: &str) -> u32 {
    let hash = blake3::hash(key.as_bytes());
    let mut zeros = 0;
    for byte in hash.as_bytes() {
        zeros += byte.leading_zeros();
        if *byte != 0 {
            break;
        }
    }
    zeros / 2
}

pub(crate) fn validate_key(key: &str) -> MstResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(MstError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(key: &str) -> Entry {
        Entry::Leaf {
            key: key.into(),
            value: BlockId::from_bytes(key.as_bytes()),
        }
    }

    #[test]
    fn empty_id_matches_encoding() {
        let bytes = NodeData::default().encode().unwrap();
        assert_eq!(ContentHasher::BLOCK.hash(&bytes), NodeData::empty_id());
    }

    #[test]
    fn decode_rejects_unordered_keys() {
        let node = NodeData::new(vec![leaf("b"), leaf("a")]);
        let bytes = node.encode().unwrap();
        let id = ContentHasher::BLOCK.hash(&bytes);
        assert!(matches!(
            NodeData::decode(id, &bytes),
            Err(MstError::InvalidNode { .. })
        ));
    }

    #[test]
    fn decode_rejects_adjacent_trees() {
        let child = BlockId::from_bytes(b"child");
        let node = NodeData::new(vec![Entry::Tree(child), Entry::Tree(child)]);
        let bytes = node.encode().unwrap();
        assert!(NodeData::decode(BlockId::from_bytes(&bytes), &bytes).is_err());
    }

    #[test]
    fn find_gte_skips_trees() {
        let entries = vec![
            Entry::Tree(BlockId::from_bytes(b"t")),
            leaf("c"),
            leaf("f"),
        ];
        assert_eq!(find_gte_leaf(&entries, "a"), 1);
        assert_eq!(find_gte_leaf(&entries, "d"), 2);
        assert_eq!(find_gte_leaf(&entries, "z"), 3);
    }

    #[test]
    fn layers_are_mostly_zero() {
        let keys: Vec<String> = (0..1000).map(|i| format!("com.example.post/{i}")).collect();
        let zero = keys.iter().filter(|k| layer_for_key(k) == 0).count();
        // Three quarters of keys land on layer zero; allow generous slack.
        assert!(zero > 650 && zero < 850, "{zero}");
        assert_eq!(layer_for_key("stable"), layer_for_key("stable"));
    }

    #[test]
    fn key_limits() {
        assert!(validate_key("").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
        assert!(validate_key("com.example.post/1").is_ok());
    }
}
