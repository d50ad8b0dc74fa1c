use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::Did;
use crate::syntax::{is_valid_nsid, is_valid_record_key};

/// Location of a record inside one repository: `collection/recordKey`.
///
/// The string form is also the record's key in the repository tree, so the
/// tree orders records by collection first and record key second.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordPath {
    collection: String,
    rkey: String,
}

impl RecordPath {
    pub fn new(collection: impl Into<String>, rkey: impl Into<String>) -> Result<Self, TypeError> {
        let collection = collection.into();
        let rkey = rkey.into();
        if !is_valid_nsid(&collection) {
            return Err(TypeError::InvalidCollection(collection));
        }
        if !is_valid_record_key(&rkey) {
            return Err(TypeError::InvalidRecordKey(rkey));
        }
        Ok(Self { collection, rkey })
    }

    /// Parse a tree key of the form `collection/recordKey`.
    pub fn parse(key: &str) -> Result<Self, TypeError> {
        let (collection, rkey) = key
            .split_once('/')
            .ok_or_else(|| TypeError::InvalidRecordPath(key.to_string()))?;
        Self::new(collection, rkey)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn rkey(&self) -> &str {
        &self.rkey
    }

    /// The repository-tree key for this record.
    pub fn to_key(&self) -> String {
        format!("{}/{}", self.collection, self.rkey)
    }

    /// Tree-key prefix that selects every record of a collection.
    pub fn collection_prefix(collection: &str) -> String {
        format!("{collection}/")
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.rkey)
    }
}

/// Fully-qualified record address: `at://did/collection/recordKey`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordUri {
    pub did: Did,
    pub path: RecordPath,
}

impl RecordUri {
    pub fn new(did: Did, path: RecordPath) -> Self {
        Self { did, path }
    }
}

impl fmt::Display for RecordUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}", self.did, self.path)
    }
}
