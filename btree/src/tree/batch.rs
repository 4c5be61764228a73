//! Batch coordinator.
//!
//! A [`Batch`] is the unit of work of a tree. The engine reads and writes
//! nodes only through it:
//! - reads are served from staged writes, then from a read cache, then from
//!   the backend
//! - writes and deletes are staged in memory, a later write of a node
//!   cancelling its pending delete and vice versa
//! - [`Batch::flush`] sends all staged deletes and writes (nodes and
//!   identifier records) to the backend in one go
//!
//! Dropping a batch without flushing discards everything it staged, leaving
//! the backend untouched.

use std::collections::{HashMap, HashSet};

use crate::storage::{Backend, IndexRecord, NodeKey, RecordKey, decode, encode};
use crate::tree::error::TreeError;
use crate::tree::identifier::IdentifierIndex;
use crate::tree::node::Node;
use crate::tree::{TreeKey, TreeValue};

/// Staging state of one unit of work on a tree.
pub struct Batch<'a, K, V, B> {
    backend: &'a B,
    scope: &'a str,
    pub(super) degree: usize,
    staged: HashMap<NodeKey, Node<K, V>>,
    cache: HashMap<NodeKey, Node<K, V>>,
    deleted: HashSet<NodeKey>,
    pub(super) identifiers: IdentifierIndex<K, V>,
}

impl<'a, K, V, B> Batch<'a, K, V, B>
where
    K: TreeKey,
    V: TreeValue,
    B: Backend,
{
    pub fn new(backend: &'a B, scope: &'a str, degree: usize) -> Self {
        Self {
            backend,
            scope,
            degree,
            staged: HashMap::new(),
            cache: HashMap::new(),
            deleted: HashSet::new(),
            identifiers: IdentifierIndex::new(),
        }
    }

    /// Name of the tree this batch works on.
    pub const fn scope(&self) -> &str {
        self.scope
    }

    /// Get a copy of the node stored under `key`.
    ///
    /// Changes to the copy must be staged with [`Batch::stage_put`].
    pub fn get_node(&mut self, key: NodeKey) -> Result<Node<K, V>, TreeError> {
        if let Some(node) = self.staged.get(&key) {
            return Ok(node.clone());
        }
        if self.deleted.contains(&key) {
            return Err(TreeError::Corruption(format!(
                "node {key} of tree '{}' was deleted in this batch",
                self.scope
            )));
        }
        if let Some(node) = self.cache.get(&key) {
            return Ok(node.clone());
        }

        let Some(bytes) = self.backend.read(self.scope, &RecordKey::Node(key))? else {
            return Err(TreeError::Corruption(format!(
                "node {key} of tree '{}' is missing",
                self.scope
            )));
        };
        let mut node: Node<K, V> = decode(&bytes)?;
        node.locator = key;
        self.cache.insert(key, node.clone());
        Ok(node)
    }

    /// Get a copy of the current root.
    pub fn root(&mut self) -> Result<Node<K, V>, TreeError> {
        self.get_node(NodeKey::Root)
    }

    /// Create an empty node with a freshly allocated identity.
    ///
    /// The node is not staged.
    pub fn make_node(&mut self) -> Result<Node<K, V>, TreeError> {
        let id = self.backend.allocate_id(self.scope)?;
        Ok(Node::new(NodeKey::Assigned(id), id))
    }

    /// Stage `node` to be written under its locator.
    pub fn stage_put(&mut self, node: &Node<K, V>) {
        self.deleted.remove(&node.locator);
        self.staged.insert(node.locator, node.clone());
    }

    /// Stage the record under `node`'s locator for deletion.
    pub fn stage_delete(&mut self, node: &Node<K, V>) {
        self.staged.remove(&node.locator);
        self.deleted.insert(node.locator);
    }

    /// The `(key, value)` stored with `identifier`, if it is in the tree.
    pub fn identifier_entry(&mut self, identifier: &str) -> Result<Option<(K, V)>, TreeError> {
        if let Some(cached) = self.identifiers.cached(identifier) {
            return Ok(cached.clone());
        }

        let entry = self
            .backend
            .read(self.scope, &RecordKey::Identifier(identifier.to_string()))?
            .map(|bytes| decode::<IndexRecord<K, V>>(&bytes))
            .transpose()?
            .map(|record| (record.key, record.value));
        self.identifiers
            .remember(identifier.to_string(), entry.clone());
        Ok(entry)
    }

    /// Load the index records of many identifiers with one backend read.
    ///
    /// Identifiers already cached in this batch are skipped.
    pub fn prime_identifiers<'i, I>(&mut self, identifiers: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = &'i str>,
    {
        let mut seen = HashSet::new();
        let missing: Vec<String> = identifiers
            .into_iter()
            .filter(|id| self.identifiers.cached(id).is_none() && seen.insert(*id))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        tracing::trace!(tree = %self.scope, count = missing.len(), "priming identifier cache");
        let keys: Vec<RecordKey> = missing.iter().cloned().map(RecordKey::Identifier).collect();
        let records = self.backend.read_many(self.scope, &keys)?;
        for (identifier, bytes) in missing.into_iter().zip(records) {
            let entry = bytes
                .map(|bytes| decode::<IndexRecord<K, V>>(&bytes))
                .transpose()?
                .map(|record| (record.key, record.value));
            self.identifiers.remember(identifier, entry);
        }
        Ok(())
    }

    /// Whether anything was staged.
    pub fn is_dirty(&self) -> bool {
        !self.staged.is_empty() || !self.deleted.is_empty() || self.identifiers.is_dirty()
    }

    /// Write everything staged in this batch to the backend.
    ///
    /// # Pre-conditions
    ///
    /// - Runs inside the backend transaction that covers the whole batch.
    pub fn flush(mut self) -> Result<(), TreeError> {
        if !self.is_dirty() {
            return Ok(());
        }

        let (identifier_deletes, identifier_puts) = self.identifiers.take_changes();

        let mut deletes: Vec<RecordKey> = self.deleted.drain().map(RecordKey::Node).collect();
        deletes.extend(identifier_deletes.into_iter().map(RecordKey::Identifier));

        let mut puts = Vec::with_capacity(self.staged.len() + identifier_puts.len());
        for (key, node) in self.staged.drain() {
            puts.push((RecordKey::Node(key), encode(&node)?));
        }
        for (identifier, record) in identifier_puts {
            puts.push((RecordKey::Identifier(identifier), encode(&record)?));
        }

        tracing::debug!(
            tree = %self.scope,
            puts = puts.len(),
            deletes = deletes.len(),
            "flushing batch"
        );
        if !deletes.is_empty() {
            self.backend.delete_many(self.scope, &deletes)?;
        }
        self.backend.write_many(self.scope, puts)?;
        Ok(())
    }
}
