//! Tree flavours.
//!
//! The three flavours share one engine and differ only in how duplicates are
//! handled and in the shape of the items they return.

use crate::storage::TreeKind;
use crate::tree::error::TreeError;
use crate::tree::node::Entry;

mod sealed {
    pub trait Sealed {}
}

/// Marker trait of a tree flavour. Implemented by [`Unique`], [`Multi`] and
/// [`Tagged`] only.
pub trait Variant: sealed::Sealed {
    /// Kind stored in the tree record.
    const KIND: TreeKind;
    /// Whether equal keys are kept side by side.
    const ALLOW_DUPLICATES: bool;

    /// Item returned by lookups.
    type Item<K, V>;

    /// Turn a stored entry into an item.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Corruption`] if the entry lacks what the flavour
    /// stores with every entry.
    fn present<K, V>(entry: Entry<K, V>) -> Result<Self::Item<K, V>, TreeError>;
}

/// Unique keys; inserting an existing key overwrites its value.
#[derive(Debug, Clone, Copy)]
pub enum Unique {}

/// Duplicate keys, kept in insertion order.
#[derive(Debug, Clone, Copy)]
pub enum Multi {}

/// Duplicate keys, each entry tagged with a unique identifier.
#[derive(Debug, Clone, Copy)]
pub enum Tagged {}

impl sealed::Sealed for Unique {}
impl sealed::Sealed for Multi {}
impl sealed::Sealed for Tagged {}

impl Variant for Unique {
    const KIND: TreeKind = TreeKind::Set;
    const ALLOW_DUPLICATES: bool = false;

    type Item<K, V> = (K, V);

    fn present<K, V>(entry: Entry<K, V>) -> Result<(K, V), TreeError> {
        Ok((entry.key, entry.value))
    }
}

impl Variant for Multi {
    const KIND: TreeKind = TreeKind::Multi;
    const ALLOW_DUPLICATES: bool = true;

    type Item<K, V> = (K, V);

    fn present<K, V>(entry: Entry<K, V>) -> Result<(K, V), TreeError> {
        Ok((entry.key, entry.value))
    }
}

impl Variant for Tagged {
    const KIND: TreeKind = TreeKind::Tagged;
    const ALLOW_DUPLICATES: bool = true;

    type Item<K, V> = (K, V, String);

    fn present<K, V>(entry: Entry<K, V>) -> Result<(K, V, String), TreeError> {
        let Some(identifier) = entry.identifier else {
            return Err(TreeError::Corruption(
                "tagged entry without an identifier".to_string(),
            ));
        };
        Ok((entry.key, entry.value, identifier))
    }
}
