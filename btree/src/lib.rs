#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code; a broken node must surface as an error.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! A persistent, counted B-tree over a transactional key/value backend.
//!
//! Every node carries the item count of each child subtree, so besides the
//! usual key-based access the tree answers rank and select queries
//! (`lower_bound`, `get_by_index`, `pop`, ...) in `O(log n)` node reads.
//!
//! Three flavours share one engine:
//! - [`SetTree`]: unique keys, an insert overwrites the existing value.
//! - [`MultiTree`]: duplicate keys, kept in insertion order.
//! - [`TaggedTree`]: duplicate keys plus a caller-supplied unique identifier
//!   per entry, indexed for direct lookup and removal.
//!
//! Nodes, the tree record and identifier entries are stored as separate
//! records in a [`Backend`]. All work happens inside a batch: reads are
//! cached, writes are staged in memory, and the whole batch is flushed as one
//! backend transaction when it completes. A failing batch leaves the backend
//! untouched.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use counted_btree::{MemoryBackend, SetTree};
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let mut tree: SetTree<u32, String, _> = SetTree::create(backend, "scores", 2)?;
//!
//! tree.perform_in_batch(|batch| {
//!     for x in 0..10 {
//!         batch.insert(x, x.to_string())?;
//!     }
//!     Ok(())
//! })?;
//!
//! assert_eq!(tree.tree_size()?, 10);
//! assert_eq!(tree.get_by_index(3)?, (3, "3".to_string()));
//! assert_eq!(tree.lower_bound(&7)?, 7);
//! # Ok::<(), counted_btree::TreeError>(())
//! ```

pub mod config;
pub mod storage;
pub mod tree;

#[cfg(test)]
mod e2e_tests;

pub use config::{ConfigError, TreeConfig};
pub use storage::{Backend, BackendError, FaultConfig, MemoryBackend, MemoryBackendStats};
pub use tree::{
    BTree, Entry, Multi, MultiTree, SetTree, Tagged, TaggedTree, TreeBatch, TreeError, TreeKey,
    TreeKind, TreeValue, Unique, Variant,
};
