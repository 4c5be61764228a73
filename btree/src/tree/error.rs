//! Tree error type.

use crate::config::ConfigError;
use crate::storage::{BackendError, TreeKind};

/// Errors returned by tree operations.
///
/// A failing operation inside a batch aborts the whole batch: nothing staged
/// in it reaches the backend.
#[derive(Debug)]
pub enum TreeError {
    /// Invalid tree configuration.
    Config(ConfigError),
    /// Tree names must not be empty.
    InvalidName,
    /// Identifiers must not be empty.
    InvalidIdentifier(String),
    /// Only unit-step slices are supported.
    SteppedSlice(usize),
    /// Index-based access past the end of the tree.
    IndexOutOfRange { index: usize, size: usize },
    /// The key is not in the tree.
    KeyNotFound,
    /// No tree with this name exists.
    TreeNotFound(String),
    /// A tree with this name already exists.
    AlreadyExists(String),
    /// The tree was created with a different variant.
    KindMismatch {
        name: String,
        expected: TreeKind,
        found: TreeKind,
    },
    /// Stored tree state is inconsistent.
    Corruption(String),
    /// The backend failed.
    Backend(BackendError),
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::InvalidName => write!(f, "tree name must not be empty"),
            Self::InvalidIdentifier(id) => write!(f, "invalid identifier: '{id}'"),
            Self::SteppedSlice(step) => {
                write!(f, "slices must have a step of 1, got {step}")
            }
            Self::IndexOutOfRange { index, size } => {
                write!(f, "index {index} out of range for tree of size {size}")
            }
            Self::KeyNotFound => write!(f, "key not found in the tree"),
            Self::TreeNotFound(name) => write!(f, "tree '{name}' not found"),
            Self::AlreadyExists(name) => write!(f, "tree '{name}' already exists"),
            Self::KindMismatch {
                name,
                expected,
                found,
            } => write!(f, "tree '{name}' is a {found} tree, not a {expected} tree"),
            Self::Corruption(msg) => write!(f, "tree corruption: {msg}"),
            Self::Backend(e) => write!(f, "backend error: {e}"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Backend(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for TreeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<BackendError> for TreeError {
    fn from(e: BackendError) -> Self {
        Self::Backend(e)
    }
}
