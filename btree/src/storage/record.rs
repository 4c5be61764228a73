//! Persisted record types and their encoding.
//!
//! Records are encoded as JSON so that any serde-compatible key and value
//! type can be stored without a schema. Node records are defined next to the
//! node model in `tree::node`; this module holds the small fixed records.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::storage::backend::BackendError;

/// Which facade a tree was created with.
///
/// Stored in the tree record so that a tree cannot be reopened with
/// different key semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeKind {
    /// Unique keys.
    Set,
    /// Duplicate keys in insertion order.
    Multi,
    /// Duplicate keys with unique identifiers.
    Tagged,
}

impl std::fmt::Display for TreeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Multi => write!(f, "multi"),
            Self::Tagged => write!(f, "tagged"),
        }
    }
}

/// The tree record. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRecord {
    /// Minimum degree `t`.
    pub degree: usize,
    /// Facade the tree was created with.
    pub kind: TreeKind,
}

/// An identifier index entry: the key and value stored with an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord<K, V> {
    pub key: K,
    pub value: V,
}

/// Encode a record for storage.
pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, BackendError> {
    Ok(serde_json::to_vec(record)?)
}

/// Decode a stored record.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BackendError> {
    Ok(serde_json::from_slice(bytes)?)
}
