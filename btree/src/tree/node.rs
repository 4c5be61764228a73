//! Counted B-tree node.
//!
//! A node is one backend record. It holds parallel arrays of keys, values and
//! (for tagged trees) identifiers, plus the child links of an internal node
//! and the item count of every child subtree.
//!
//! # Invariants
//!
//! - `keys.len() == values.len()`
//! - `ids` is either empty or `ids.len() == keys.len()`
//! - leaf: `links` and `counts` are empty
//! - internal: `links.len() == counts.len() == keys.len() + 1`, and
//!   `counts[i]` is the number of items below `links[i]`
//!
//! # Identifier callbacks
//!
//! Mutations that add or drop an entry from the tree (`insert`, `replace`,
//! `pop_item`) report identifiers to the [`IdentifierIndex`]. Mutations that
//! only move an entry between nodes during rebalancing (`*_entry`,
//! `split_into`, `extend_with`) do not, since the entry stays in the tree.

use serde::{Deserialize, Serialize};

use crate::storage::NodeKey;
use crate::tree::identifier::IdentifierIndex;

/// A single tree entry: key, value and optional identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
    pub identifier: Option<String>,
}

impl<K, V> Entry<K, V> {
    /// Create an entry without identifier.
    pub const fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            identifier: None,
        }
    }

    /// Create an entry with an identifier.
    pub const fn tagged(key: K, value: V, identifier: String) -> Self {
        Self {
            key,
            value,
            identifier: Some(identifier),
        }
    }
}

/// A node of the tree, as stored in the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node<K, V> {
    /// Where this node is stored. Not persisted: it is the record key.
    #[serde(skip)]
    pub locator: NodeKey,
    /// Identity given at creation, restored when the node stops being root.
    #[serde(rename = "aid")]
    pub assigned_id: u64,
    #[serde(rename = "k")]
    pub keys: Vec<K>,
    #[serde(rename = "v")]
    pub values: Vec<V>,
    #[serde(rename = "i", default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(rename = "l", default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<u64>,
    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    pub counts: Vec<usize>,
}

impl<K, V> Node<K, V> {
    /// Create an empty leaf.
    pub const fn new(locator: NodeKey, assigned_id: u64) -> Self {
        Self {
            locator,
            assigned_id,
            keys: Vec::new(),
            values: Vec::new(),
            ids: Vec::new(),
            links: Vec::new(),
            counts: Vec::new(),
        }
    }

    #[allow(clippy::missing_const_for_fn)] // Vec::is_empty is not const
    pub fn is_leaf(&self) -> bool {
        self.links.is_empty()
    }

    /// Number of entries in this node.
    #[allow(clippy::missing_const_for_fn)] // Vec::len is not const
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    /// Number of entries in the subtree rooted at this node.
    pub fn subtree_size(&self) -> usize {
        self.counts.iter().sum::<usize>() + self.keys.len()
    }

    /// Number of entries in the subtrees left of link `i`.
    pub fn counts_before(&self, i: usize) -> usize {
        self.counts.iter().take(i).sum()
    }

    /// Link of child `i` as a node locator.
    pub fn child(&self, i: usize) -> NodeKey {
        NodeKey::Assigned(self.links[i])
    }
}

impl<K: Ord, V> Node<K, V> {
    /// Position of the first key not less than `key`.
    pub fn lower_position(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k < key)
    }

    /// Position of the first key strictly greater than `key`.
    pub fn upper_position(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k <= key)
    }
}

impl<K: Clone, V: Clone> Node<K, V> {
    /// The entry at `pos`.
    pub fn item(&self, pos: usize) -> Entry<K, V> {
        Entry {
            key: self.keys[pos].clone(),
            value: self.values[pos].clone(),
            identifier: self.ids.get(pos).cloned(),
        }
    }

    /// Entries in `[lo, hi)`, clamped to the node.
    pub fn items(&self, lo: usize, hi: usize) -> Vec<Entry<K, V>> {
        let hi = hi.min(self.size());
        (lo.min(hi)..hi).map(|pos| self.item(pos)).collect()
    }

    /// Insert a new entry at `pos`.
    pub fn insert(&mut self, pos: usize, entry: Entry<K, V>, index: &mut IdentifierIndex<K, V>) {
        if let Some(id) = &entry.identifier {
            index.added(id, &entry.key, &entry.value);
        }
        self.insert_entry(pos, entry);
    }

    /// Replace the entry at `pos`, returning the old one.
    ///
    /// The counts are unchanged: the node keeps the same number of entries.
    pub fn replace(
        &mut self,
        pos: usize,
        entry: Entry<K, V>,
        index: &mut IdentifierIndex<K, V>,
    ) -> Entry<K, V> {
        if entry.identifier.is_some()
            && let Some(old_id) = self.ids.get(pos)
        {
            index.removed(old_id);
        }
        if let Some(id) = &entry.identifier {
            index.added(id, &entry.key, &entry.value);
        }
        self.swap_entry(pos, entry)
    }

    /// Remove the entry at `pos` from the tree.
    pub fn pop_item(&mut self, pos: usize, index: &mut IdentifierIndex<K, V>) -> Entry<K, V> {
        let entry = self.take_entry(pos);
        if let Some(id) = &entry.identifier {
            index.removed(id);
        }
        entry
    }
}

impl<K, V> Node<K, V> {
    /// Place a moved entry at `pos`.
    pub fn insert_entry(&mut self, pos: usize, entry: Entry<K, V>) {
        self.keys.insert(pos, entry.key);
        self.values.insert(pos, entry.value);
        if let Some(id) = entry.identifier {
            self.ids.insert(pos, id);
        }
    }

    /// Append a moved entry.
    pub fn push_entry(&mut self, entry: Entry<K, V>) {
        let pos = self.size();
        self.insert_entry(pos, entry);
    }

    /// Take the entry at `pos` out for a move.
    pub fn take_entry(&mut self, pos: usize) -> Entry<K, V> {
        Entry {
            key: self.keys.remove(pos),
            value: self.values.remove(pos),
            identifier: (pos < self.ids.len()).then(|| self.ids.remove(pos)),
        }
    }

    /// Swap the entry at `pos` with a moved one.
    pub fn swap_entry(&mut self, pos: usize, entry: Entry<K, V>) -> Entry<K, V> {
        let key = std::mem::replace(&mut self.keys[pos], entry.key);
        let value = std::mem::replace(&mut self.values[pos], entry.value);
        let identifier = match entry.identifier {
            Some(id) if pos < self.ids.len() => Some(std::mem::replace(&mut self.ids[pos], id)),
            _ => self.ids.get(pos).cloned(),
        };
        Entry {
            key,
            value,
            identifier,
        }
    }

    /// Move everything after the median at `median` into the empty node
    /// `right` and take the median out.
    pub fn split_into(&mut self, median: usize, right: &mut Self) -> Entry<K, V> {
        right.keys = self.keys.split_off(median + 1);
        right.values = self.values.split_off(median + 1);
        if self.ids.len() > median {
            right.ids = self.ids.split_off(median + 1);
        }
        if !self.is_leaf() {
            right.links = self.links.split_off(median + 1);
            right.counts = self.counts.split_off(median + 1);
        }
        self.take_entry(median)
    }

    /// Append the whole contents of `other` to this node.
    pub fn extend_with(&mut self, other: Self) {
        self.keys.extend(other.keys);
        self.values.extend(other.values);
        self.ids.extend(other.ids);
        self.links.extend(other.links);
        self.counts.extend(other.counts);
    }
}
