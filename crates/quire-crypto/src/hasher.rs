use quire_types::BlockId;

/// Domain-separated BLAKE3 content hasher.
///
/// The domain tag is prepended to every hash computation, so an address
/// computed for one purpose can never collide with one computed for another.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for every stored block: records, tree nodes and commits.
    pub const BLOCK: Self = Self {
        domain: "quire-block-v1",
    };
    /// Hasher for the placeholder address of a repository without commits.
    pub const EMPTY_MARKER: Self = Self {
        domain: "quire-empty-v1",
    };

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> BlockId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        BlockId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected address.
    pub fn verify(&self, data: &[u8], expected: &BlockId) -> bool {
        self.hash(data) == *expected
    }

    pub fn domain(&self) -> &str {
        self.domain
    }

    /// Address standing in for "repository exists but has no commits".
    pub fn empty_marker() -> BlockId {
        Self::EMPTY_MARKER.hash(b"empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = ContentHasher::BLOCK.hash(b"hello world");
        let b = ContentHasher::BLOCK.hash(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn domains_do_not_collide() {
        assert_ne!(
            ContentHasher::BLOCK.hash(b"empty"),
            ContentHasher::empty_marker()
        );
        assert_ne!(
            ContentHasher::BLOCK.hash(b"data"),
            ContentHasher::new("other-v1").hash(b"data")
        );
    }

    #[test]
    fn domain_hash_differs_from_raw() {
        assert_ne!(ContentHasher::BLOCK.hash(b"x"), BlockId::from_bytes(b"x"));
    }

    #[test]
    fn verify_detects_tampering() {
        let id = ContentHasher::BLOCK.hash(b"original");
        assert!(ContentHasher::BLOCK.verify(b"original", &id));
        assert!(!ContentHasher::BLOCK.verify(b"tampered", &id));
    }

    #[test]
    fn empty_marker_is_stable() {
        assert_eq!(ContentHasher::empty_marker(), ContentHasher::empty_marker());
        assert_eq!(ContentHasher::EMPTY_MARKER.domain(), "quire-empty-v1");
    }
}
