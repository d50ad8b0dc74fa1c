use chrono::{DateTime, Utc};
use quire_crypto::{ChainLink, ContentHasher, Signature, Signer, VerifyingKey};
use quire_types::{BlockId, Did, Tid};
use serde::{Deserialize, Serialize};

use crate::error::{CommitError, CommitResult};

/// The signed portion of a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedCommit {
    pub did: Did,
    /// Position in the chain, starting at 1.
    pub version: u64,
    pub prev: Option<BlockId>,
    /// Root of the repository tree at this commit.
    pub data: BlockId,
    pub rev: Tid,
    pub signing_key_id: String,
    pub created_at: DateTime<Utc>,
}

impl UnsignedCommit {
    /// Canonical bytes covered by the signature.
    pub fn signing_bytes(&self) -> CommitResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CommitError::Encoding(e.to_string()))
    }

    pub fn sign(self, signer: &dyn Signer) -> CommitResult<Commit> {
        let bytes = self.signing_bytes()?;
        let signature = signer.sign(&bytes)?;
        Ok(Commit {
            unsigned: self,
            signature,
        })
    }
}

/// A signed commit as stored in its block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub unsigned: UnsignedCommit,
    pub signature: Signature,
}

impl Commit {
    pub fn encode(&self) -> CommitResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CommitError::Encoding(e.to_string()))
    }

    pub fn decode(id: BlockId, bytes: &[u8]) -> CommitResult<Self> {
        bincode::deserialize(bytes).map_err(|e| CommitError::Decode {
            id,
            reason: e.to_string(),
        })
    }

    /// Check the signature against `key`.
    pub fn verify(&self, key: &VerifyingKey) -> CommitResult<()> {
        let bytes = self.unsigned.signing_bytes()?;
        key.verify(&bytes, &self.signature)?;
        Ok(())
    }

    /// Check the signature against the key named in the commit.
    pub fn verify_self_signed(&self) -> CommitResult<()> {
        let key = VerifyingKey::from_key_id(&self.unsigned.signing_key_id)?;
        self.verify(&key)
    }

    pub fn did(&self) -> &Did {
        &self.unsigned.did
    }

    pub fn version(&self) -> u64 {
        self.unsigned.version
    }

    pub fn prev(&self) -> Option<BlockId> {
        self.unsigned.prev
    }

    pub fn data(&self) -> BlockId {
        self.unsigned.data
    }

    pub fn rev(&self) -> Tid {
        self.unsigned.rev
    }
}

/// A commit together with its block address and encoded bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitEntry {
    pub id: BlockId,
    pub commit: Commit,
    pub bytes: Vec<u8>,
}

impl CommitEntry {
    pub fn new(commit: Commit) -> CommitResult<Self> {
        let bytes = commit.encode()?;
        Ok(Self {
            id: ContentHasher::BLOCK.hash(&bytes),
            commit,
            bytes,
        })
    }

    /// Decode a stored commit block. The address is trusted; stores verify
    /// it on read.
    pub fn from_block(id: BlockId, bytes: Vec<u8>) -> CommitResult<Self> {
        let commit = Commit::decode(id, &bytes)?;
        Ok(Self { id, commit, bytes })
    }
}

impl ChainLink for CommitEntry {
    fn link_id(&self) -> BlockId {
        self.id
    }

    fn prev_link(&self) -> Option<BlockId> {
        self.commit.prev()
    }

    fn sequence(&self) -> u64 {
        self.commit.version()
    }

    fn encoded(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}
