use quire_types::BlockId;
use serde::{Deserialize, Serialize};

use crate::error::{CarError, CarResult};

const VERSION: u64 = 1;

/// Archive header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarHeader {
    pub version: u64,
    pub roots: Vec<BlockId>,
}

impl CarHeader {
    pub fn new(roots: Vec<BlockId>) -> Self {
        Self {
            version: VERSION,
            roots,
        }
    }

    pub fn encode(&self) -> CarResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CarError::Parsing(e.to_string()))
    }

    pub fn decode(buffer: &[u8]) -> CarResult<Self> {
        let header: Self =
            bincode::deserialize(buffer).map_err(|e| CarError::Parsing(e.to_string()))?;
        if header.version != VERSION {
            return Err(CarError::UnsupportedVersion(header.version));
        }
        if header.roots.is_empty() {
            return Err(CarError::Parsing("archive has no roots".into()));
        }
        Ok(header)
    }

    pub fn roots(&self) -> &[BlockId] {
        &self.roots
    }
}
