//! Counted B-tree.
//!
//! This module provides:
//! - `node`: the node model and its identifier callbacks
//! - `identifier`: the identifier index of tagged trees
//! - `batch`: the batch coordinator staging reads and writes
//! - `engine`: insert, delete, rank and range algorithms
//! - `variant`: the set, multi and tagged flavours
//! - `facade`: the public [`BTree`] and [`TreeBatch`] API

mod batch;
mod engine;
mod error;
mod facade;
mod identifier;
mod node;
mod variant;

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use crate::storage::TreeKind;
pub use error::TreeError;
pub use facade::{BTree, MultiTree, SetTree, TaggedTree, TreeBatch};
pub use node::Entry;
pub use variant::{Multi, Tagged, Unique, Variant};

/// Types usable as tree keys.
pub trait TreeKey: Ord + Clone + Debug + Serialize + DeserializeOwned {}

impl<T: Ord + Clone + Debug + Serialize + DeserializeOwned> TreeKey for T {}

/// Types usable as tree values.
pub trait TreeValue: Clone + Debug + Serialize + DeserializeOwned {}

impl<T: Clone + Debug + Serialize + DeserializeOwned> TreeValue for T {}
