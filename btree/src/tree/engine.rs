//! Counted B-tree algorithms.
//!
//! All algorithms run on a [`Batch`] and touch nodes only through it. Every
//! node that is changed is staged again before the algorithm returns, so the
//! staged copy is always the latest one.
//!
//! # Structure
//!
//! With minimum degree `t`:
//! - every node except the root holds between `t - 1` and `2t - 1` entries
//! - the root is split before an insert descends into it when full, and is
//!   replaced by its only child when a delete empties it
//! - deletes make sure a child has at least `t` entries before descending
//!   into it, borrowing from a sibling or merging with one
//!
//! # Ranks
//!
//! Internal nodes store the size of every child subtree, so the rank of an
//! entry is the number of entries in the subtrees and node entries to its
//! left. Rank queries and index-based deletes descend by these counts.
//!
//! # Root locator
//!
//! The root is always stored under [`NodeKey::Root`]. When the tree grows
//! the old root moves back under its assigned id; when it shrinks the only
//! child moves under `Root` and its assigned id record is deleted.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::storage::{Backend, NodeKey};
use crate::tree::batch::Batch;
use crate::tree::error::TreeError;
use crate::tree::node::{Entry, Node};
use crate::tree::{TreeKey, TreeValue};

impl<K, V, B> Batch<'_, K, V, B>
where
    K: TreeKey,
    V: TreeValue,
    B: Backend,
{
    fn is_full(&self, node: &Node<K, V>) -> bool {
        node.size() == 2 * self.degree - 1
    }

    /// Number of entries in the tree.
    pub fn size(&mut self) -> Result<usize, TreeError> {
        Ok(self.root()?.subtree_size())
    }

    // ---------------------------------------------------------------------
    // Insert
    // ---------------------------------------------------------------------

    /// Insert an entry.
    ///
    /// An entry with the same identifier is removed first. Without
    /// duplicates, an entry with an equal key is overwritten in place.
    pub fn insert(&mut self, entry: Entry<K, V>, allow_duplicates: bool) -> Result<(), TreeError> {
        if let Some(identifier) = &entry.identifier {
            self.delete_identifier(identifier)?;
        }

        let mut root = self.root()?;
        if self.is_full(&root) {
            let mut new_root = self.make_node()?;
            new_root.locator = NodeKey::Root;
            root.locator = NodeKey::Assigned(root.assigned_id);
            new_root.links.push(root.assigned_id);
            new_root.counts.push(root.subtree_size());
            self.stage_put(&root);
            self.stage_put(&new_root);
            tracing::debug!(
                tree = %self.scope(),
                old_root = root.assigned_id,
                new_root = new_root.assigned_id,
                "growing tree"
            );
            self.split_child(&mut new_root, 0)?;
            root = new_root;
        }

        self.insert_nonfull(&mut root, entry, allow_duplicates)?;
        Ok(())
    }

    /// Insert into the subtree of a non-full `node`, returning its new size.
    fn insert_nonfull(
        &mut self,
        node: &mut Node<K, V>,
        entry: Entry<K, V>,
        allow_duplicates: bool,
    ) -> Result<usize, TreeError> {
        loop {
            let i = node.upper_position(&entry.key);

            if !allow_duplicates && i > 0 && node.keys[i - 1] == entry.key {
                node.replace(i - 1, entry, &mut self.identifiers);
                self.stage_put(node);
                return Ok(node.subtree_size());
            }

            if node.is_leaf() {
                node.insert(i, entry, &mut self.identifiers);
            } else {
                let mut child = self.get_node(node.child(i))?;
                if self.is_full(&child) {
                    // The median moved up into this node; decide again.
                    self.split_child(node, i)?;
                    continue;
                }
                node.counts[i] = self.insert_nonfull(&mut child, entry, allow_duplicates)?;
            }

            self.stage_put(node);
            return Ok(node.subtree_size());
        }
    }

    /// Split the full child `i` of the non-full `node` around its median.
    fn split_child(&mut self, node: &mut Node<K, V>, i: usize) -> Result<(), TreeError> {
        let mut split = self.get_node(node.child(i))?;
        if !self.is_full(&split) {
            return Err(TreeError::Corruption(format!(
                "splitting node {} with {} entries",
                split.locator,
                split.size()
            )));
        }

        let mut right = self.make_node()?;
        let median = split.split_into(self.degree - 1, &mut right);
        node.insert_entry(i, median);
        node.links.insert(i + 1, right.assigned_id);
        node.counts[i] = split.subtree_size();
        node.counts.insert(i + 1, right.subtree_size());

        tracing::trace!(
            tree = %self.scope(),
            node = %split.locator,
            right = right.assigned_id,
            "split node"
        );
        self.stage_put(node);
        self.stage_put(&split);
        self.stage_put(&right);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Delete
    // ---------------------------------------------------------------------

    /// Delete the leftmost entry with `key`.
    pub fn delete_key(&mut self, key: &K) -> Result<Option<Entry<K, V>>, TreeError> {
        let mut root = self.root()?;
        let deleted = self.delete_key_from(&mut root, key)?;
        self.replace_root_if_required(&root)?;
        Ok(deleted)
    }

    fn delete_key_from(
        &mut self,
        node: &mut Node<K, V>,
        key: &K,
    ) -> Result<Option<Entry<K, V>>, TreeError> {
        let i = node.lower_position(key);
        let contains_key = i < node.size() && node.keys[i] == *key;

        if node.is_leaf() {
            if !contains_key {
                return Ok(None);
            }
            let deleted = node.pop_item(i, &mut self.identifiers);
            self.stage_put(node);
            return Ok(Some(deleted));
        }

        if !contains_key {
            let (mut child, child_i, _) = self.child_with_minimum_degree(node, i)?;
            let deleted = self.delete_key_from(&mut child, key)?;
            node.counts[child_i] = child.subtree_size();
            self.stage_put(node);
            return Ok(deleted);
        }

        // The key is in this internal node: replace it by its predecessor or
        // successor when a child can spare an entry.
        let mut left = self.get_node(node.child(i))?;
        if left.size() >= self.degree {
            let predecessor = self.find_predecessor(&left)?;
            let moved = self.delete_key_from(&mut left, &predecessor)?.ok_or_else(|| {
                TreeError::Corruption(format!("predecessor missing below node {}", node.locator))
            })?;
            let deleted = node.replace(i, moved, &mut self.identifiers);
            node.counts[i] = left.subtree_size();
            self.stage_put(node);
            return Ok(Some(deleted));
        }

        let mut right = self.get_node(node.child(i + 1))?;
        if right.size() >= self.degree {
            let successor = self.find_successor(&right)?;
            let moved = self.delete_key_from(&mut right, &successor)?.ok_or_else(|| {
                TreeError::Corruption(format!("successor missing below node {}", node.locator))
            })?;
            let deleted = node.replace(i, moved, &mut self.identifiers);
            node.counts[i + 1] = right.subtree_size();
            self.stage_put(node);
            return Ok(Some(deleted));
        }

        // Neither child can spare an entry: pull the key down into the merged
        // child and delete it there.
        let mut child = self.merge_with_right_sibling(node, i)?;
        let deleted = self.delete_key_from(&mut child, key)?;
        node.counts[i] = child.subtree_size();
        self.stage_put(node);
        Ok(deleted)
    }

    /// Delete the entry at rank `index`.
    pub fn delete_index(&mut self, index: usize) -> Result<Entry<K, V>, TreeError> {
        let mut root = self.root()?;
        let size = root.subtree_size();
        if index >= size {
            return Err(TreeError::IndexOutOfRange { index, size });
        }
        let deleted = self.delete_index_from(&mut root, index)?;
        self.replace_root_if_required(&root)?;
        Ok(deleted)
    }

    fn delete_index_from(
        &mut self,
        node: &mut Node<K, V>,
        index: usize,
    ) -> Result<Entry<K, V>, TreeError> {
        if node.is_leaf() {
            if index >= node.size() {
                return Err(TreeError::Corruption(format!(
                    "rank {index} past the end of leaf {}",
                    node.locator
                )));
            }
            let deleted = node.pop_item(index, &mut self.identifiers);
            self.stage_put(node);
            return Ok(deleted);
        }

        // Find the child subtree holding the rank, or the entry of this node
        // at that rank.
        let mut index = index;
        let mut target = None;
        for (i, &count) in node.counts.iter().enumerate() {
            if index < count {
                target = Some((i, true));
                break;
            }
            if index == count {
                target = Some((i, false));
                break;
            }
            index -= count + 1;
        }
        let Some((i, in_subtree)) = target.filter(|&(i, in_subtree)| in_subtree || i < node.size())
        else {
            return Err(TreeError::Corruption(format!(
                "rank past the end of node {}",
                node.locator
            )));
        };

        if in_subtree {
            let (mut child, child_i, offset) = self.child_with_minimum_degree(node, i)?;
            let deleted = self.delete_index_from(&mut child, index + offset)?;
            node.counts[child_i] = child.subtree_size();
            self.stage_put(node);
            return Ok(deleted);
        }

        // The rank is entry `i` of this node, and `index` is the size of the
        // subtree left of it.
        let mut left = self.get_node(node.child(i))?;
        if left.size() >= self.degree {
            let moved = self.delete_index_from(&mut left, index - 1)?;
            let deleted = node.replace(i, moved, &mut self.identifiers);
            node.counts[i] = left.subtree_size();
            self.stage_put(node);
            return Ok(deleted);
        }

        let mut right = self.get_node(node.child(i + 1))?;
        if right.size() >= self.degree {
            let moved = self.delete_index_from(&mut right, 0)?;
            let deleted = node.replace(i, moved, &mut self.identifiers);
            node.counts[i + 1] = right.subtree_size();
            self.stage_put(node);
            return Ok(deleted);
        }

        // After the merge the entry sits right after the old left subtree.
        let mut child = self.merge_with_right_sibling(node, i)?;
        let deleted = self.delete_index_from(&mut child, index)?;
        node.counts[i] = child.subtree_size();
        self.stage_put(node);
        Ok(deleted)
    }

    /// Delete the entries at ranks `[a, b)`, returning them in order.
    pub fn delete_range(&mut self, a: usize, b: usize) -> Result<Vec<Entry<K, V>>, TreeError> {
        (a..b).map(|_| self.delete_index(a)).collect()
    }

    /// Delete every entry with `key`.
    pub fn delete_key_all(&mut self, key: &K) -> Result<Vec<Entry<K, V>>, TreeError> {
        match (self.left_index_of_key(key)?, self.right_index_of_key(key)?) {
            (Some(a), Some(b)) => self.delete_range(a, b),
            _ => Ok(Vec::new()),
        }
    }

    /// Delete the entry tagged with `identifier`, if any.
    pub fn delete_identifier(&mut self, identifier: &str) -> Result<Option<Entry<K, V>>, TreeError> {
        let Some((key, _)) = self.identifier_entry(identifier)? else {
            return Ok(None);
        };
        let Some(index) = self.index_for_key_and_identifier(&key, identifier)? else {
            return Err(TreeError::Corruption(format!(
                "identifier '{identifier}' is indexed but not in tree '{}'",
                self.scope()
            )));
        };
        self.delete_index(index).map(Some)
    }

    /// Make sure child `index` of `node` holds at least `t` entries.
    ///
    /// Returns the child, its possibly changed position in `node`, and how
    /// far ranks inside the child moved to the right.
    fn child_with_minimum_degree(
        &mut self,
        node: &mut Node<K, V>,
        index: usize,
    ) -> Result<(Node<K, V>, usize, usize), TreeError> {
        let mut child = self.get_node(node.child(index))?;
        if child.size() >= self.degree {
            return Ok((child, index, 0));
        }

        let mut left_size = None;
        if index > 0 {
            let mut left = self.get_node(node.child(index - 1))?;
            if left.size() >= self.degree {
                // Rotate right: the separator moves down to the child and the
                // left sibling's last entry takes its place.
                let last = left.size() - 1;
                let separator = node.swap_entry(index - 1, left.take_entry(last));
                child.insert_entry(0, separator);
                let mut moved = 0;
                if let (Some(link), Some(count)) = (left.links.pop(), left.counts.pop()) {
                    child.links.insert(0, link);
                    child.counts.insert(0, count);
                    moved = count;
                }
                node.counts[index - 1] = left.subtree_size();
                node.counts[index] = child.subtree_size();
                tracing::trace!(tree = %self.scope(), node = %child.locator, "borrowed from left sibling");
                self.stage_put(node);
                self.stage_put(&child);
                self.stage_put(&left);
                return Ok((child, index, moved + 1));
            }
            left_size = Some(left.subtree_size());
        }

        if index < node.size() {
            let mut right = self.get_node(node.child(index + 1))?;
            if right.size() >= self.degree {
                // Rotate left.
                let separator = node.swap_entry(index, right.take_entry(0));
                child.push_entry(separator);
                if !right.is_leaf() {
                    child.links.push(right.links.remove(0));
                    child.counts.push(right.counts.remove(0));
                }
                node.counts[index] = child.subtree_size();
                node.counts[index + 1] = right.subtree_size();
                tracing::trace!(tree = %self.scope(), node = %child.locator, "borrowed from right sibling");
                self.stage_put(node);
                self.stage_put(&child);
                self.stage_put(&right);
                return Ok((child, index, 0));
            }
            if left_size.is_none() {
                return Ok((self.merge_with_right_sibling(node, index)?, index, 0));
            }
        }

        match left_size {
            // The left sibling and the separator now come before the child.
            Some(size) => Ok((
                self.merge_with_right_sibling(node, index - 1)?,
                index - 1,
                size + 1,
            )),
            None => Err(TreeError::Corruption(format!(
                "node {} has no sibling for child {index}",
                node.locator
            ))),
        }
    }

    /// Merge child `index` of `node`, the separator and child `index + 1`
    /// into child `index`, deleting the right child.
    fn merge_with_right_sibling(
        &mut self,
        node: &mut Node<K, V>,
        index: usize,
    ) -> Result<Node<K, V>, TreeError> {
        let mut left = self.get_node(node.child(index))?;
        let right = self.get_node(node.child(index + 1))?;
        if left.size() != self.degree - 1 || right.size() != self.degree - 1 {
            return Err(TreeError::Corruption(format!(
                "merging nodes {} and {} with {} and {} entries",
                left.locator,
                right.locator,
                left.size(),
                right.size()
            )));
        }

        left.push_entry(node.take_entry(index));
        self.stage_delete(&right);
        left.extend_with(right);
        node.links.remove(index + 1);
        node.counts.remove(index + 1);
        node.counts[index] = left.subtree_size();

        tracing::trace!(tree = %self.scope(), node = %left.locator, "merged with right sibling");
        self.stage_put(node);
        self.stage_put(&left);
        Ok(left)
    }

    /// Replace an empty root by its only child.
    fn replace_root_if_required(&mut self, root: &Node<K, V>) -> Result<(), TreeError> {
        if root.size() > 0 || root.is_leaf() {
            return Ok(());
        }
        if root.links.len() != 1 {
            return Err(TreeError::Corruption(format!(
                "empty root with {} children",
                root.links.len()
            )));
        }

        let mut new_root = self.get_node(root.child(0))?;
        self.stage_delete(&new_root);
        tracing::debug!(
            tree = %self.scope(),
            old_root = root.assigned_id,
            new_root = new_root.assigned_id,
            "shrinking tree"
        );
        new_root.locator = NodeKey::Root;
        self.stage_put(&new_root);
        Ok(())
    }

    /// Largest key in the subtree of `node`.
    fn find_predecessor(&mut self, node: &Node<K, V>) -> Result<K, TreeError> {
        let mut current = node.clone();
        while !current.is_leaf() {
            current = self.get_node(current.child(current.links.len() - 1))?;
        }
        current
            .keys
            .last()
            .cloned()
            .ok_or_else(|| TreeError::Corruption(format!("empty leaf {}", current.locator)))
    }

    /// Smallest key in the subtree of `node`.
    fn find_successor(&mut self, node: &Node<K, V>) -> Result<K, TreeError> {
        let mut current = node.clone();
        while !current.is_leaf() {
            current = self.get_node(current.child(0))?;
        }
        current
            .keys
            .first()
            .cloned()
            .ok_or_else(|| TreeError::Corruption(format!("empty leaf {}", current.locator)))
    }

    // ---------------------------------------------------------------------
    // Rank queries
    // ---------------------------------------------------------------------

    /// Rank of the first entry whose key is not less than `key`.
    pub fn lower_bound_index(&mut self, key: &K) -> Result<usize, TreeError> {
        self.bound_index(|node| node.lower_position(key))
    }

    /// Rank of the first entry whose key is greater than `key`.
    pub fn upper_bound_index(&mut self, key: &K) -> Result<usize, TreeError> {
        self.bound_index(|node| node.upper_position(key))
    }

    fn bound_index<F>(&mut self, position: F) -> Result<usize, TreeError>
    where
        F: Fn(&Node<K, V>) -> usize,
    {
        let mut node = self.root()?;
        let mut rank = 0;
        loop {
            let i = position(&node);
            if node.is_leaf() {
                return Ok(rank + i);
            }
            rank += node.counts_before(i) + i;
            node = self.get_node(node.child(i))?;
        }
    }

    /// Rank of the first entry with `key`, if any.
    pub fn left_index_of_key(&mut self, key: &K) -> Result<Option<usize>, TreeError> {
        let root = self.root()?;
        self.left_index_in(&root, key)
    }

    fn left_index_in(&mut self, node: &Node<K, V>, key: &K) -> Result<Option<usize>, TreeError> {
        if node.size() == 0 {
            return Ok(None);
        }
        let i = node.lower_position(key);
        let found_here = i < node.size() && node.keys[i] == *key;
        if node.is_leaf() {
            return Ok(found_here.then_some(i));
        }

        let before = node.counts_before(i);
        let child = self.get_node(node.child(i))?;
        if let Some(index) = self.left_index_in(&child, key)? {
            return Ok(Some(before + index + i));
        }
        Ok(found_here.then(|| before + node.counts[i] + i))
    }

    /// Rank one past the last entry with `key`, if any.
    pub fn right_index_of_key(&mut self, key: &K) -> Result<Option<usize>, TreeError> {
        let root = self.root()?;
        self.right_index_in(&root, key)
    }

    fn right_index_in(&mut self, node: &Node<K, V>, key: &K) -> Result<Option<usize>, TreeError> {
        if node.size() == 0 {
            return Ok(None);
        }
        let i = node.upper_position(key);
        let found_here = i > 0 && node.keys[i - 1] == *key;
        if node.is_leaf() {
            return Ok(found_here.then_some(i));
        }

        let before = node.counts_before(i);
        let child = self.get_node(node.child(i))?;
        if let Some(index) = self.right_index_in(&child, key)? {
            return Ok(Some(before + index + i));
        }
        Ok(found_here.then_some(before + i))
    }

    /// Rank of the entry with `key` tagged `identifier`, if any.
    ///
    /// Scans the run of `key` in each node and descends into every child
    /// bracketed by that run.
    pub fn index_for_key_and_identifier(
        &mut self,
        key: &K,
        identifier: &str,
    ) -> Result<Option<usize>, TreeError> {
        let root = self.root()?;
        self.index_for_key_and_identifier_in(&root, key, identifier)
    }

    fn index_for_key_and_identifier_in(
        &mut self,
        node: &Node<K, V>,
        key: &K,
        identifier: &str,
    ) -> Result<Option<usize>, TreeError> {
        let i = node.lower_position(key);
        let j = node.upper_position(key);
        if let Some(x) = (i..j).find(|&x| node.ids.get(x).is_some_and(|id| id == identifier)) {
            return Ok(Some(node.counts_before(x + 1) + x));
        }
        if !node.is_leaf() {
            for x in i..=j {
                let child = self.get_node(node.child(x))?;
                if let Some(index) = self.index_for_key_and_identifier_in(&child, key, identifier)? {
                    return Ok(Some(node.counts_before(x) + index + x));
                }
            }
        }
        Ok(None)
    }

    // ---------------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------------

    /// The leftmost entry with `key`.
    pub fn get_by_key(&mut self, key: &K) -> Result<Option<Entry<K, V>>, TreeError> {
        let root = self.root()?;
        self.first_in(&root, key)
    }

    fn first_in(&mut self, node: &Node<K, V>, key: &K) -> Result<Option<Entry<K, V>>, TreeError> {
        if node.size() == 0 {
            return Ok(None);
        }
        let i = node.lower_position(key);
        if !node.is_leaf() {
            let child = self.get_node(node.child(i))?;
            if let Some(entry) = self.first_in(&child, key)? {
                return Ok(Some(entry));
            }
        }
        Ok((i < node.size() && node.keys[i] == *key).then(|| node.item(i)))
    }

    /// Every entry with `key`, in order.
    pub fn get_all_by_key(&mut self, key: &K) -> Result<Vec<Entry<K, V>>, TreeError> {
        let root = self.root()?;
        let mut entries = Vec::new();
        self.all_in(&root, key, &mut entries)?;
        Ok(entries)
    }

    fn all_in(
        &mut self,
        node: &Node<K, V>,
        key: &K,
        out: &mut Vec<Entry<K, V>>,
    ) -> Result<(), TreeError> {
        let i = node.lower_position(key);
        let j = node.upper_position(key);
        if node.is_leaf() {
            out.extend(node.items(i, j));
            return Ok(());
        }
        for x in i..=j {
            let child = self.get_node(node.child(x))?;
            self.all_in(&child, key, out)?;
            if x < j {
                out.push(node.item(x));
            }
        }
        Ok(())
    }

    /// Up to `count` entries starting at rank `start`.
    ///
    /// Stops reading nodes as soon as enough entries are collected.
    pub fn collect_range(&mut self, start: usize, count: usize) -> Result<Vec<Entry<K, V>>, TreeError> {
        let mut out = Vec::new();
        if count == 0 {
            return Ok(out);
        }
        let root = self.root()?;
        self.collect_in(&root, start, count, &mut out)?;
        Ok(out)
    }

    fn collect_in(
        &mut self,
        node: &Node<K, V>,
        start: usize,
        count: usize,
        out: &mut Vec<Entry<K, V>>,
    ) -> Result<(), TreeError> {
        if node.is_leaf() {
            out.extend(node.items(start, start.saturating_add(count)));
            return Ok(());
        }

        let mut index = start;
        let mut remaining = count;
        for (x, &subtree) in node.counts.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            if index >= subtree {
                index -= subtree;
            } else {
                let before = out.len();
                let child = self.get_node(node.child(x))?;
                self.collect_in(&child, index, remaining, out)?;
                remaining -= out.len() - before;
                index = 0;
            }
            if x < node.size() && remaining > 0 {
                if index == 0 {
                    out.push(node.item(x));
                    remaining -= 1;
                } else {
                    index -= 1;
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Verification and debugging
    // ---------------------------------------------------------------------

    /// Walk the whole tree and check every structural invariant.
    ///
    /// Also checks that every identifier is unique and indexed with the
    /// entry's key.
    pub fn check_invariants(&mut self, allow_duplicates: bool) -> Result<(), TreeError> {
        let root = self.root()?;
        if root.size() == 0 && !root.is_leaf() {
            return Err(TreeError::Corruption("empty internal root".to_string()));
        }
        let mut check = Check {
            allow_duplicates,
            leaf_depth: None,
            identifiers: HashSet::new(),
        };
        self.check_node(&root, true, None, None, 0, &mut check)?;
        Ok(())
    }

    fn check_node(
        &mut self,
        node: &Node<K, V>,
        is_root: bool,
        lower: Option<&K>,
        upper: Option<&K>,
        depth: usize,
        check: &mut Check,
    ) -> Result<usize, TreeError> {
        let corrupt = |what: &str| {
            Err(TreeError::Corruption(format!("node {}: {what}", node.locator)))
        };

        if node.values.len() != node.size() {
            return corrupt("values do not match keys");
        }
        if !node.ids.is_empty() && node.ids.len() != node.size() {
            return corrupt("identifiers do not match keys");
        }
        if node.size() > 2 * self.degree - 1 {
            return corrupt("too many entries");
        }
        if !is_root && node.size() < self.degree - 1 {
            return corrupt("too few entries");
        }
        let ordered = node.keys.windows(2).all(|pair| {
            if check.allow_duplicates {
                pair[0] <= pair[1]
            } else {
                pair[0] < pair[1]
            }
        });
        if !ordered {
            return corrupt("keys out of order");
        }
        // Equal separators are only legal when duplicates are.
        let below = |key: &K, bound: &K| key < bound || (!check.allow_duplicates && key == bound);
        let above = |key: &K, bound: &K| key > bound || (!check.allow_duplicates && key == bound);
        if lower.is_some_and(|lower| node.keys.first().is_some_and(|first| below(first, lower)))
            || upper.is_some_and(|upper| node.keys.last().is_some_and(|last| above(last, upper)))
        {
            return corrupt("keys outside the parent's separators");
        }

        for (x, identifier) in node.ids.iter().enumerate() {
            if !check.identifiers.insert(identifier.clone()) {
                return corrupt("duplicate identifier");
            }
            match self.identifier_entry(identifier)? {
                Some((key, _)) if key == node.keys[x] => {}
                _ => return corrupt("identifier not indexed with its key"),
            }
        }

        if node.is_leaf() {
            if !node.counts.is_empty() {
                return corrupt("leaf with counts");
            }
            match check.leaf_depth {
                Some(leaf_depth) if leaf_depth != depth => return corrupt("leaves at different depths"),
                _ => check.leaf_depth = Some(depth),
            }
            return Ok(node.size());
        }

        if node.links.len() != node.size() + 1 || node.counts.len() != node.links.len() {
            return corrupt("links do not match keys");
        }
        for x in 0..node.links.len() {
            let child = self.get_node(node.child(x))?;
            let lower = if x == 0 { lower } else { node.keys.get(x - 1) };
            let upper = node.keys.get(x).or(upper);
            let size = self.check_node(&child, false, lower, upper, depth + 1, check)?;
            if size != node.counts[x] {
                return corrupt("stale subtree count");
            }
        }
        Ok(node.subtree_size())
    }

    /// One line per node, children indented below their parent.
    pub fn dump(&mut self) -> Result<String, TreeError> {
        self.render(|node| {
            format!(
                "Node(id={}, keys={:?}, values={:?}, ids={:?}, links={:?}, counts={:?})",
                node.locator, node.keys, node.values, node.ids, node.links, node.counts
            )
        })
    }

    /// Size, degree and the shape of the tree.
    pub fn summary(&mut self) -> Result<String, TreeError> {
        let header = format!("tree size: {}\ndegree: {}\n\n", self.size()?, self.degree);
        let body = self.render(|node| format!("Node(id: {}, {} items)", node.locator, node.size()))?;
        Ok(header + &body)
    }

    fn render<F>(&mut self, line: F) -> Result<String, TreeError>
    where
        F: Fn(&Node<K, V>) -> String,
    {
        let mut out = String::new();
        let mut stack = vec![(self.root()?, 0)];
        while let Some((node, indent)) = stack.pop() {
            if !out.is_empty() {
                out.push('\n');
            }
            let _ = write!(out, "{:indent$}{}", "", line(&node));
            for x in (0..node.links.len()).rev() {
                stack.push((self.get_node(node.child(x))?, indent + 4));
            }
        }
        Ok(out)
    }
}

/// State carried through [`Batch::check_invariants`].
struct Check {
    allow_duplicates: bool,
    leaf_depth: Option<usize>,
    identifiers: HashSet<String>,
}
