use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content address of an immutable block.
///
/// A `BlockId` is a 32-byte BLAKE3 digest. Identical content always produces
/// the same `BlockId`, which makes blocks deduplicatable and verifiable. The
/// canonical domain-separated digest used for stored blocks is computed by
/// `quire_crypto::ContentHasher::BLOCK`; [`BlockId::from_bytes`] is the raw,
/// undomained variant used for tests and fixtures.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId([u8; 32]);

impl BlockId {
    /// Length of an encoded address in bytes.
    pub const LEN: usize = 32;

    /// Compute a `BlockId` from raw bytes without domain separation.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a `BlockId` from a pre-computed hash.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a 32-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.short_hex())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for BlockId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<BlockId> for [u8; 32] {
    fn from(id: BlockId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_is_deterministic() {
        assert_eq!(BlockId::from_bytes(b"hello"), BlockId::from_bytes(b"hello"));
        assert_ne!(BlockId::from_bytes(b"hello"), BlockId::from_bytes(b"world"));
    }

    #[test]
    fn hex_roundtrip() {
        let id = BlockId::from_bytes(b"test");
        assert_eq!(BlockId::from_hex(&id.to_hex()).unwrap(), id);
        assert_eq!(id.short_hex().len(), 8);
        assert_eq!(format!("{id}").len(), 64);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let err = BlockId::from_slice(&[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 3
            }
        );
    }

    #[test]
    fn ordering_follows_bytes() {
        assert!(BlockId::from_hash([0; 32]) < BlockId::from_hash([1; 32]));
    }
}
