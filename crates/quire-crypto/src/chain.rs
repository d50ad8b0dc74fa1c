use quire_types::BlockId;

use crate::hasher::ContentHasher;

/// A link in an append-only, content-addressed chain.
pub trait ChainLink {
    /// The link's own block address.
    fn link_id(&self) -> BlockId;
    /// Address of the previous link (None for genesis).
    fn prev_link(&self) -> Option<BlockId>;
    /// Position in the chain, starting at 1.
    fn sequence(&self) -> u64;
    /// The encoded block whose address must equal `link_id`.
    fn encoded(&self) -> Vec<u8>;
}

/// Chain integrity verifier.
///
/// A valid chain starts with a genesis link at sequence 1 and no predecessor;
/// every later link points at the previous link's address and advances the
/// sequence by exactly one. Every link's address must match its encoding.
pub struct ChainVerifier;

impl ChainVerifier {
    /// Verify links ordered oldest first.
    pub fn verify_chain<L: ChainLink>(links: &[L]) -> Result<(), ChainError> {
        let Some(genesis) = links.first() else {
            return Ok(());
        };
        if genesis.prev_link().is_some() {
            return Err(ChainError::GenesisHasPrev);
        }
        if genesis.sequence() != 1 {
            return Err(ChainError::SequenceGap {
                index: 0,
                expected: 1,
                actual: genesis.sequence(),
            });
        }
        Self::verify_address(genesis, 0)?;

        for (index, pair) in links.windows(2).enumerate() {
            let index = index + 1;
            let (prev, link) = (&pair[0], &pair[1]);
            Self::verify_link(prev, link, index)?;
            Self::verify_address(link, index)?;
        }
        Ok(())
    }

    /// Verify that `link` directly follows `prev`.
    pub fn verify_link<L: ChainLink>(prev: &L, link: &L, index: usize) -> Result<(), ChainError> {
        match link.prev_link() {
            Some(p) if p == prev.link_id() => {}
            Some(_) => return Err(ChainError::BrokenLink { index }),
            None => return Err(ChainError::MissingPrev { index }),
        }
        let expected = prev.sequence() + 1;
        if link.sequence() != expected {
            return Err(ChainError::SequenceGap {
                index,
                expected,
                actual: link.sequence(),
            });
        }
        Ok(())
    }

    /// Verify that `link` hashes to its own address.
    pub fn verify_address<L: ChainLink>(link: &L, index: usize) -> Result<(), ChainError> {
        if ContentHasher::BLOCK.verify(&link.encoded(), &link.link_id()) {
            Ok(())
        } else {
            Err(ChainError::HashMismatch { index })
        }
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("genesis link has a predecessor")]
    GenesisHasPrev,

    #[error("broken link at index {index}: predecessor address does not match")]
    BrokenLink { index: usize },

    #[error("missing predecessor at index {index}")]
    MissingPrev { index: usize },

    #[error("sequence gap at index {index}: expected {expected}, found {actual}")]
    SequenceGap {
        index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("hash mismatch at index {index}: address differs from encoded bytes")]
    HashMismatch { index: usize },
}
