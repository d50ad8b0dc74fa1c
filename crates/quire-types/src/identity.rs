use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Decentralized identity owning a repository.
///
/// Quire treats the DID as an opaque, non-empty string. Method-specific
/// syntax checks are the caller's responsibility.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Wrap a DID string, rejecting empty or whitespace-only values.
    pub fn new(did: impl Into<String>) -> Result<Self, TypeError> {
        let did = did.into();
        if did.trim().is_empty() {
            return Err(TypeError::EmptyDid);
        }
        Ok(Self(did))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Did {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Storage key selecting one identity's shard.
///
/// Shard ids are small integers allocated by the identity map. An id is never
/// reused, even after the owning identity is wiped.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(u64);

impl ShardId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id allocated after this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShardId({})", self.0)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_rejects_empty() {
        assert_eq!(Did::new("").unwrap_err(), TypeError::EmptyDid);
        assert_eq!(Did::new("   ").unwrap_err(), TypeError::EmptyDid);
    }

    #[test]
    fn did_is_opaque() {
        let did = Did::new("did:example:abc").unwrap();
        assert_eq!(did.as_str(), "did:example:abc");
        assert_eq!(did.to_string(), "did:example:abc");
        // No method validation: anything non-empty is accepted.
        assert!(Did::new("not-a-did").is_ok());
    }

    #[test]
    fn did_serializes_as_plain_string() {
        let did = Did::new("did:plc:alice").unwrap();
        assert_eq!(serde_json::to_string(&did).unwrap(), "\"did:plc:alice\"");
    }

    #[test]
    fn shard_ids_order_and_advance() {
        let a = ShardId::new(1);
        assert_eq!(a.next(), ShardId::new(2));
        assert!(a < a.next());
        assert_eq!(a.next().get(), 2);
    }
}
