//! Identifier index of tagged trees.
//!
//! Every entry of a tagged tree carries a caller-supplied identifier that is
//! unique across the tree. Besides the node that holds the entry, each
//! identifier has its own backend record mapping it to the entry's key and
//! value, so an entry can be found without scanning the tree.
//!
//! Within a batch the index keeps a cache in front of those records:
//! - `Some((key, value))`: the identifier is in the tree with that entry
//! - `None`: the identifier is not in the tree
//! - not cached: the backend record is the truth
//!
//! Cached state is always newer than the backend. The node mutations in
//! `tree::node` keep it current through [`IdentifierIndex::added`] and
//! [`IdentifierIndex::removed`], which also stage the record writes and
//! deletes flushed with the batch.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::storage::IndexRecord;

/// Per-batch identifier cache and staged index record changes.
#[derive(Debug)]
pub struct IdentifierIndex<K, V> {
    cache: HashMap<String, Option<(K, V)>>,
    puts: BTreeMap<String, IndexRecord<K, V>>,
    deletes: BTreeSet<String>,
}

impl<K, V> IdentifierIndex<K, V> {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            puts: BTreeMap::new(),
            deletes: BTreeSet::new(),
        }
    }

    /// Cached state of an identifier, if it was seen in this batch.
    pub fn cached(&self, identifier: &str) -> Option<&Option<(K, V)>> {
        self.cache.get(identifier)
    }

    /// Record what the backend holds for an identifier.
    ///
    /// Ignored when the identifier is already cached, as the cached state is
    /// newer.
    pub fn remember(&mut self, identifier: String, entry: Option<(K, V)>) {
        self.cache.entry(identifier).or_insert(entry);
    }

    /// Whether any index record has to be written or deleted.
    pub fn is_dirty(&self) -> bool {
        !self.puts.is_empty() || !self.deletes.is_empty()
    }

    /// Take the staged changes: identifiers to delete and records to write.
    pub fn take_changes(&mut self) -> (Vec<String>, Vec<(String, IndexRecord<K, V>)>) {
        let deletes = std::mem::take(&mut self.deletes).into_iter().collect();
        let puts = std::mem::take(&mut self.puts).into_iter().collect();
        (deletes, puts)
    }
}

impl<K: Clone, V: Clone> IdentifierIndex<K, V> {
    /// An entry with `identifier` was added to a node.
    pub fn added(&mut self, identifier: &str, key: &K, value: &V) {
        self.deletes.remove(identifier);
        self.puts.insert(
            identifier.to_string(),
            IndexRecord {
                key: key.clone(),
                value: value.clone(),
            },
        );
        self.cache
            .insert(identifier.to_string(), Some((key.clone(), value.clone())));
    }

    /// The entry with `identifier` was removed from a node.
    pub fn removed(&mut self, identifier: &str) {
        self.puts.remove(identifier);
        self.deletes.insert(identifier.to_string());
        self.cache.insert(identifier.to_string(), None);
    }
}

impl<K, V> Default for IdentifierIndex<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
