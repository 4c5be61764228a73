//! Public tree API.
//!
//! A [`BTree`] is a handle on a named tree in a backend. Every operation
//! runs in a batch: either a one-operation batch opened by the method
//! itself, or an explicit one opened with [`BTree::perform_in_batch`], whose
//! [`TreeBatch`] exposes the same operations and shares one node cache and
//! one flush between all of them.
//!
//! # Batch lifecycle
//!
//! 1. A backend transaction is opened, unless one is already active on the
//!    calling thread.
//! 2. The work runs against the batch; nodes are read through its cache and
//!    changes are staged in memory.
//! 3. If the work succeeds, the staged changes are flushed and the
//!    transaction commits. If it fails, the staging is dropped and the
//!    backend is left untouched.
//!
//! Taking `&mut self` in [`BTree::perform_in_batch`] keeps the tree handle
//! out of its own batch, so there is only ever one batch per handle.

use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use crate::config::TreeConfig;
use crate::storage::{Backend, NodeKey, RecordKey, TreeRecord, decode, encode};
use crate::tree::batch::Batch;
use crate::tree::error::TreeError;
use crate::tree::node::{Entry, Node};
use crate::tree::variant::{Multi, Tagged, Unique, Variant};
use crate::tree::{TreeKey, TreeValue};

/// A persistent counted B-tree.
///
/// `M` selects the flavour; see [`SetTree`], [`MultiTree`] and
/// [`TaggedTree`].
pub struct BTree<K, V, B, M> {
    backend: Arc<B>,
    name: String,
    degree: usize,
    _marker: PhantomData<fn() -> (K, V, M)>,
}

/// Ordered map: unique keys.
pub type SetTree<K, V, B> = BTree<K, V, B, Unique>;

/// Ordered multimap: duplicate keys in insertion order.
pub type MultiTree<K, V, B> = BTree<K, V, B, Multi>;

/// Ordered multimap whose entries carry a unique identifier.
pub type TaggedTree<K, V, B> = BTree<K, V, B, Tagged>;

/// An open batch on a tree.
pub struct TreeBatch<'a, K, V, B, M> {
    inner: Batch<'a, K, V, B>,
    _variant: PhantomData<fn() -> M>,
}

impl<K, V, B, M> BTree<K, V, B, M>
where
    K: TreeKey,
    V: TreeValue,
    B: Backend,
    M: Variant,
{
    /// Create a new tree.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::AlreadyExists`] if a tree with this name exists,
    /// and [`TreeError::Config`] if `degree` is smaller than 2.
    pub fn create(backend: Arc<B>, name: impl Into<String>, degree: usize) -> Result<Self, TreeError> {
        let config = TreeConfig::new(degree)?;
        let name = name.into();
        validate_name(&name)?;

        backend.transact(|| {
            if load_record(backend.as_ref(), &name)?.is_some() {
                return Err(TreeError::AlreadyExists(name.clone()));
            }
            Self::initialize(backend.as_ref(), &name, config.minimum_degree)
        })?;
        Ok(Self::from_parts(backend, name, config.minimum_degree))
    }

    /// Open the tree with this name, creating it with `degree` if absent.
    ///
    /// An existing tree keeps the degree it was created with.
    pub fn get_or_create(
        backend: Arc<B>,
        name: impl Into<String>,
        degree: usize,
    ) -> Result<Self, TreeError> {
        let config = TreeConfig::new(degree)?;
        Self::get_or_create_with_config(backend, name, &config)
    }

    /// Open the tree with this name, creating it from `config` if absent.
    pub fn get_or_create_with_config(
        backend: Arc<B>,
        name: impl Into<String>,
        config: &TreeConfig,
    ) -> Result<Self, TreeError> {
        let name = name.into();
        validate_name(&name)?;

        let degree = backend.transact(|| match load_record(backend.as_ref(), &name)? {
            Some(record) => check_kind::<M>(&name, record),
            None => {
                Self::initialize(backend.as_ref(), &name, config.minimum_degree)?;
                Ok(config.minimum_degree)
            }
        })?;
        Ok(Self::from_parts(backend, name, degree))
    }

    /// Open an existing tree.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::TreeNotFound`] if no tree with this name exists,
    /// and [`TreeError::KindMismatch`] if it is of another flavour.
    pub fn open(backend: Arc<B>, name: impl Into<String>) -> Result<Self, TreeError> {
        let name = name.into();
        validate_name(&name)?;
        let Some(record) = load_record(backend.as_ref(), &name)? else {
            return Err(TreeError::TreeNotFound(name));
        };
        let degree = check_kind::<M>(&name, record)?;
        Ok(Self::from_parts(backend, name, degree))
    }

    const fn from_parts(backend: Arc<B>, name: String, degree: usize) -> Self {
        Self {
            backend,
            name,
            degree,
            _marker: PhantomData,
        }
    }

    /// Write the tree record and an empty root.
    fn initialize(backend: &B, name: &str, degree: usize) -> Result<(), TreeError> {
        let root: Node<K, V> = Node::new(NodeKey::Root, backend.allocate_id(name)?);
        let record = TreeRecord {
            degree,
            kind: M::KIND,
        };
        backend.write_many(
            name,
            vec![
                (RecordKey::Tree, encode(&record)?),
                (RecordKey::Node(NodeKey::Root), encode(&root)?),
            ],
        )?;
        tracing::debug!(tree = %name, degree, kind = %M::KIND, "created tree");
        Ok(())
    }

    /// Name of the tree, which is also its backend scope.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Minimum degree the tree was created with.
    pub const fn degree(&self) -> usize {
        self.degree
    }

    /// Run several operations in one batch.
    ///
    /// The work sees its own changes immediately. Nothing reaches the
    /// backend unless the work returns `Ok`, and then everything does in
    /// one flush.
    pub fn perform_in_batch<T, F>(&mut self, work: F) -> Result<T, TreeError>
    where
        F: FnOnce(&mut TreeBatch<'_, K, V, B, M>) -> Result<T, TreeError>,
    {
        self.run(work)
    }

    fn run<T, F>(&self, work: F) -> Result<T, TreeError>
    where
        F: FnOnce(&mut TreeBatch<'_, K, V, B, M>) -> Result<T, TreeError>,
    {
        let backend = self.backend.as_ref();
        backend.transact(|| {
            let mut batch = TreeBatch {
                inner: Batch::new(backend, &self.name, self.degree),
                _variant: PhantomData,
            };
            match work(&mut batch) {
                Ok(value) => {
                    batch.inner.flush()?;
                    Ok(value)
                }
                Err(e) => {
                    tracing::debug!(tree = %self.name, error = %e, "discarding batch");
                    Err(e)
                }
            }
        })
    }

    /// Number of entries in the tree.
    pub fn tree_size(&self) -> Result<usize, TreeError> {
        self.run(|batch| batch.tree_size())
    }

    /// The item at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::IndexOutOfRange`] if `index` is not below the
    /// size of the tree.
    pub fn get_by_index(&self, index: usize) -> Result<M::Item<K, V>, TreeError> {
        self.run(|batch| batch.get_by_index(index))
    }

    /// The item `n` places from the end; `nth_back(0)` is the last item.
    pub fn nth_back(&self, n: usize) -> Result<M::Item<K, V>, TreeError> {
        self.run(|batch| batch.nth_back(n))
    }

    /// Items at indices `[a, b)`, clamped to the tree.
    pub fn get_range(&self, a: usize, b: usize) -> Result<Vec<M::Item<K, V>>, TreeError> {
        self.run(|batch| batch.get_range(a, b))
    }

    /// Items in `range`, clamped to the tree.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Result<Vec<M::Item<K, V>>, TreeError> {
        self.run(|batch| batch.slice(range))
    }

    /// Items in `range` with a step. Only a step of 1 is supported.
    pub fn slice_by<R: RangeBounds<usize>>(
        &self,
        range: R,
        step: usize,
    ) -> Result<Vec<M::Item<K, V>>, TreeError> {
        self.run(|batch| batch.slice_by(range, step))
    }

    /// Index of the first entry with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::KeyNotFound`] if the key is not in the tree.
    pub fn index(&self, key: &K) -> Result<usize, TreeError> {
        self.run(|batch| batch.index(key))
    }

    /// Index of the first entry whose key is not less than `key`.
    pub fn lower_bound(&self, key: &K) -> Result<usize, TreeError> {
        self.run(|batch| batch.lower_bound(key))
    }

    /// Index of the first entry whose key is greater than `key`.
    pub fn upper_bound(&self, key: &K) -> Result<usize, TreeError> {
        self.run(|batch| batch.upper_bound(key))
    }

    /// Remove and return the item at `index`.
    pub fn pop(&mut self, index: usize) -> Result<M::Item<K, V>, TreeError> {
        self.run(|batch| batch.pop(index))
    }

    /// Whether an entry with `key` exists.
    pub fn contains(&self, key: &K) -> Result<bool, TreeError> {
        self.run(|batch| batch.contains(key))
    }

    /// All items in order.
    pub fn items(&self) -> Result<Vec<M::Item<K, V>>, TreeError> {
        self.run(|batch| batch.items())
    }

    /// Check every structural invariant of the stored tree.
    pub fn verify(&self) -> Result<(), TreeError> {
        self.run(|batch| batch.verify())
    }

    /// Every node of the tree, one per line. For debugging.
    pub fn dump(&self) -> Result<String, TreeError> {
        self.run(|batch| batch.dump())
    }

    /// Size, degree and node shape of the tree. For debugging.
    pub fn summary(&self) -> Result<String, TreeError> {
        self.run(|batch| batch.summary())
    }

    // Shared by the multi and tagged flavours.

    fn count_key(&self, key: &K) -> Result<usize, TreeError> {
        self.run(|batch| batch.count_key(key))
    }

    fn all_by_key(&self, key: &K) -> Result<Vec<M::Item<K, V>>, TreeError> {
        self.run(|batch| batch.all_by_key(key))
    }

    fn right_index(&self, key: &K) -> Result<usize, TreeError> {
        self.run(|batch| batch.right_index(key))
    }

    fn remove_key_all(&mut self, key: &K) -> Result<Vec<M::Item<K, V>>, TreeError> {
        self.run(|batch| batch.remove_key_all(key))
    }
}

impl<K: TreeKey, V: TreeValue, B: Backend> BTree<K, V, B, Unique> {
    /// Insert an entry, overwriting the value of an existing key.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), TreeError> {
        self.run(|batch| batch.insert(key, value))
    }

    /// Insert many entries in one batch.
    pub fn update<I>(&mut self, items: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.run(|batch| batch.update(items))
    }

    /// The entry with `key`, if any.
    pub fn get(&self, key: &K) -> Result<Option<(K, V)>, TreeError> {
        self.run(|batch| batch.get(key))
    }

    /// Remove and return the entry with `key`, if any.
    pub fn remove(&mut self, key: &K) -> Result<Option<(K, V)>, TreeError> {
        self.run(|batch| batch.remove(key))
    }
}

impl<K: TreeKey, V: TreeValue, B: Backend> BTree<K, V, B, Multi> {
    /// Insert an entry after all entries with an equal key.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), TreeError> {
        self.run(|batch| batch.insert(key, value))
    }

    /// Insert many entries in one batch, in order.
    pub fn update<I>(&mut self, items: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.run(|batch| batch.update(items))
    }

    /// Number of entries with `key`.
    pub fn count(&self, key: &K) -> Result<usize, TreeError> {
        self.count_key(key)
    }

    /// All entries with `key`, in insertion order.
    pub fn get_all(&self, key: &K) -> Result<Vec<(K, V)>, TreeError> {
        self.all_by_key(key)
    }

    /// Index of the first entry with `key`.
    pub fn index_left(&self, key: &K) -> Result<usize, TreeError> {
        self.index(key)
    }

    /// Index one past the last entry with `key`.
    pub fn index_right(&self, key: &K) -> Result<usize, TreeError> {
        self.right_index(key)
    }

    /// Remove and return all entries with `key`.
    pub fn remove_all(&mut self, key: &K) -> Result<Vec<(K, V)>, TreeError> {
        self.remove_key_all(key)
    }
}

impl<K: TreeKey, V: TreeValue, B: Backend> BTree<K, V, B, Tagged> {
    /// Insert an entry tagged with `identifier`.
    ///
    /// An existing entry with the same identifier is removed first.
    pub fn insert(&mut self, key: K, value: V, identifier: impl Into<String>) -> Result<(), TreeError> {
        let identifier = identifier.into();
        self.run(|batch| batch.insert(key, value, identifier))
    }

    /// Insert many tagged entries in one batch.
    pub fn update<I>(&mut self, items: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = (K, V, String)>,
    {
        self.run(|batch| batch.update(items))
    }

    /// Number of entries with `key`.
    pub fn count(&self, key: &K) -> Result<usize, TreeError> {
        self.count_key(key)
    }

    /// All entries with `key`, in insertion order.
    pub fn get_all(&self, key: &K) -> Result<Vec<(K, V, String)>, TreeError> {
        self.all_by_key(key)
    }

    /// The entry tagged with `identifier`, if any.
    pub fn get_by_identifier(&self, identifier: &str) -> Result<Option<(K, V, String)>, TreeError> {
        self.run(|batch| batch.get_by_identifier(identifier))
    }

    /// Index of the first entry with `key`.
    pub fn index_left(&self, key: &K) -> Result<usize, TreeError> {
        self.index(key)
    }

    /// Index one past the last entry with `key`.
    pub fn index_right(&self, key: &K) -> Result<usize, TreeError> {
        self.right_index(key)
    }

    /// Remove and return all entries with `key`.
    pub fn remove_all(&mut self, key: &K) -> Result<Vec<(K, V, String)>, TreeError> {
        self.remove_key_all(key)
    }

    /// Remove and return the entry tagged with `identifier`, if any.
    pub fn remove_by_identifier(&mut self, identifier: &str) -> Result<Option<(K, V, String)>, TreeError> {
        self.run(|batch| batch.remove_by_identifier(identifier))
    }
}

impl<K, V, B, M> TreeBatch<'_, K, V, B, M>
where
    K: TreeKey,
    V: TreeValue,
    B: Backend,
    M: Variant,
{
    /// Run `work` in this batch. Nested batches share the outer one.
    pub fn perform_in_batch<T, F>(&mut self, work: F) -> Result<T, TreeError>
    where
        F: FnOnce(&mut Self) -> Result<T, TreeError>,
    {
        work(self)
    }

    fn present_all(entries: Vec<Entry<K, V>>) -> Result<Vec<M::Item<K, V>>, TreeError> {
        entries.into_iter().map(M::present).collect()
    }

    pub fn tree_size(&mut self) -> Result<usize, TreeError> {
        self.inner.size()
    }

    pub fn get_by_index(&mut self, index: usize) -> Result<M::Item<K, V>, TreeError> {
        let size = self.tree_size()?;
        if index >= size {
            return Err(TreeError::IndexOutOfRange { index, size });
        }
        self.inner
            .collect_range(index, 1)?
            .pop()
            .map(M::present)
            .transpose()?
            .ok_or_else(|| TreeError::Corruption(format!("no item at index {index} of {size}")))
    }

    pub fn nth_back(&mut self, n: usize) -> Result<M::Item<K, V>, TreeError> {
        let size = self.tree_size()?;
        if n >= size {
            return Err(TreeError::IndexOutOfRange { index: n, size });
        }
        self.get_by_index(size - 1 - n)
    }

    pub fn get_range(&mut self, a: usize, b: usize) -> Result<Vec<M::Item<K, V>>, TreeError> {
        self.slice(a..b)
    }

    pub fn slice<R: RangeBounds<usize>>(&mut self, range: R) -> Result<Vec<M::Item<K, V>>, TreeError> {
        let size = self.tree_size()?;
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(size);
        let end = match range.end_bound() {
            Bound::Included(&end) => end.saturating_add(1),
            Bound::Excluded(&end) => end,
            Bound::Unbounded => size,
        }
        .min(size);
        if end <= start {
            return Ok(Vec::new());
        }
        Self::present_all(self.inner.collect_range(start, end - start)?)
    }

    pub fn slice_by<R: RangeBounds<usize>>(
        &mut self,
        range: R,
        step: usize,
    ) -> Result<Vec<M::Item<K, V>>, TreeError> {
        if step != 1 {
            return Err(TreeError::SteppedSlice(step));
        }
        self.slice(range)
    }

    pub fn index(&mut self, key: &K) -> Result<usize, TreeError> {
        self.inner.left_index_of_key(key)?.ok_or(TreeError::KeyNotFound)
    }

    pub fn lower_bound(&mut self, key: &K) -> Result<usize, TreeError> {
        self.inner.lower_bound_index(key)
    }

    pub fn upper_bound(&mut self, key: &K) -> Result<usize, TreeError> {
        self.inner.upper_bound_index(key)
    }

    pub fn pop(&mut self, index: usize) -> Result<M::Item<K, V>, TreeError> {
        self.inner.delete_index(index).and_then(M::present)
    }

    pub fn contains(&mut self, key: &K) -> Result<bool, TreeError> {
        Ok(self.inner.get_by_key(key)?.is_some())
    }

    pub fn items(&mut self) -> Result<Vec<M::Item<K, V>>, TreeError> {
        let size = self.tree_size()?;
        Self::present_all(self.inner.collect_range(0, size)?)
    }

    pub fn verify(&mut self) -> Result<(), TreeError> {
        self.inner.check_invariants(M::ALLOW_DUPLICATES)
    }

    pub fn dump(&mut self) -> Result<String, TreeError> {
        self.inner.dump()
    }

    pub fn summary(&mut self) -> Result<String, TreeError> {
        self.inner.summary()
    }

    fn count_key(&mut self, key: &K) -> Result<usize, TreeError> {
        match (self.inner.left_index_of_key(key)?, self.inner.right_index_of_key(key)?) {
            (Some(left), Some(right)) => Ok(right - left),
            _ => Ok(0),
        }
    }

    fn all_by_key(&mut self, key: &K) -> Result<Vec<M::Item<K, V>>, TreeError> {
        Self::present_all(self.inner.get_all_by_key(key)?)
    }

    fn right_index(&mut self, key: &K) -> Result<usize, TreeError> {
        self.inner.right_index_of_key(key)?.ok_or(TreeError::KeyNotFound)
    }

    fn remove_key_all(&mut self, key: &K) -> Result<Vec<M::Item<K, V>>, TreeError> {
        Self::present_all(self.inner.delete_key_all(key)?)
    }
}

impl<K: TreeKey, V: TreeValue, B: Backend> TreeBatch<'_, K, V, B, Unique> {
    pub fn insert(&mut self, key: K, value: V) -> Result<(), TreeError> {
        self.inner.insert(Entry::new(key, value), false)
    }

    pub fn update<I>(&mut self, items: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        items
            .into_iter()
            .try_for_each(|(key, value)| self.insert(key, value))
    }

    pub fn get(&mut self, key: &K) -> Result<Option<(K, V)>, TreeError> {
        self.inner.get_by_key(key)?.map(Unique::present).transpose()
    }

    pub fn remove(&mut self, key: &K) -> Result<Option<(K, V)>, TreeError> {
        self.inner.delete_key(key)?.map(Unique::present).transpose()
    }
}

impl<K: TreeKey, V: TreeValue, B: Backend> TreeBatch<'_, K, V, B, Multi> {
    pub fn insert(&mut self, key: K, value: V) -> Result<(), TreeError> {
        self.inner.insert(Entry::new(key, value), true)
    }

    pub fn update<I>(&mut self, items: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        items
            .into_iter()
            .try_for_each(|(key, value)| self.insert(key, value))
    }

    pub fn count(&mut self, key: &K) -> Result<usize, TreeError> {
        self.count_key(key)
    }

    pub fn get_all(&mut self, key: &K) -> Result<Vec<(K, V)>, TreeError> {
        self.all_by_key(key)
    }

    pub fn index_left(&mut self, key: &K) -> Result<usize, TreeError> {
        self.index(key)
    }

    pub fn index_right(&mut self, key: &K) -> Result<usize, TreeError> {
        self.right_index(key)
    }

    pub fn remove_all(&mut self, key: &K) -> Result<Vec<(K, V)>, TreeError> {
        self.remove_key_all(key)
    }
}

impl<K: TreeKey, V: TreeValue, B: Backend> TreeBatch<'_, K, V, B, Tagged> {
    pub fn insert(&mut self, key: K, value: V, identifier: impl Into<String>) -> Result<(), TreeError> {
        let identifier = validate_identifier(identifier.into())?;
        self.inner.insert(Entry::tagged(key, value, identifier), true)
    }

    /// Insert many tagged entries.
    ///
    /// All identifiers are validated before anything is inserted, and their
    /// index records are fetched with a single backend read. When an
    /// identifier repeats, the last entry wins.
    pub fn update<I>(&mut self, items: I) -> Result<(), TreeError>
    where
        I: IntoIterator<Item = (K, V, String)>,
    {
        let items = items
            .into_iter()
            .map(|(key, value, identifier)| Ok((key, value, validate_identifier(identifier)?)))
            .collect::<Result<Vec<_>, TreeError>>()?;
        self.inner
            .prime_identifiers(items.iter().map(|(_, _, identifier)| identifier.as_str()))?;
        for (key, value, identifier) in items {
            self.inner.insert(Entry::tagged(key, value, identifier), true)?;
        }
        Ok(())
    }

    pub fn count(&mut self, key: &K) -> Result<usize, TreeError> {
        self.count_key(key)
    }

    pub fn get_all(&mut self, key: &K) -> Result<Vec<(K, V, String)>, TreeError> {
        self.all_by_key(key)
    }

    pub fn get_by_identifier(&mut self, identifier: &str) -> Result<Option<(K, V, String)>, TreeError> {
        Ok(self
            .inner
            .identifier_entry(identifier)?
            .map(|(key, value)| (key, value, identifier.to_string())))
    }

    pub fn index_left(&mut self, key: &K) -> Result<usize, TreeError> {
        self.index(key)
    }

    pub fn index_right(&mut self, key: &K) -> Result<usize, TreeError> {
        self.right_index(key)
    }

    pub fn remove_all(&mut self, key: &K) -> Result<Vec<(K, V, String)>, TreeError> {
        self.remove_key_all(key)
    }

    pub fn remove_by_identifier(&mut self, identifier: &str) -> Result<Option<(K, V, String)>, TreeError> {
        self.inner
            .delete_identifier(identifier)?
            .map(Tagged::present)
            .transpose()
    }
}

fn validate_name(name: &str) -> Result<(), TreeError> {
    if name.is_empty() {
        return Err(TreeError::InvalidName);
    }
    Ok(())
}

fn validate_identifier(identifier: String) -> Result<String, TreeError> {
    if identifier.is_empty() {
        return Err(TreeError::InvalidIdentifier(identifier));
    }
    Ok(identifier)
}

fn load_record<B: Backend>(backend: &B, name: &str) -> Result<Option<TreeRecord>, TreeError> {
    Ok(backend
        .read(name, &RecordKey::Tree)?
        .map(|bytes| decode::<TreeRecord>(&bytes))
        .transpose()?)
}

/// Check the stored flavour and return the stored degree.
fn check_kind<M: Variant>(name: &str, record: TreeRecord) -> Result<usize, TreeError> {
    if record.kind != M::KIND {
        return Err(TreeError::KindMismatch {
            name: name.to_string(),
            expected: M::KIND,
            found: record.kind,
        });
    }
    let config = TreeConfig::new(record.degree).map_err(|e| {
        TreeError::Corruption(format!("tree '{name}' has a bad stored degree: {e}"))
    })?;
    Ok(config.minimum_degree)
}
