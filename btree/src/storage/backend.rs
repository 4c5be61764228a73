//! Backend abstraction for tree persistence.
//!
//! The tree never talks to a concrete store. It reads and writes opaque
//! records through the [`Backend`] trait, which lets the same engine run on
//! a document database in production and on [`MemoryBackend`] in tests.
//!
//! # Design
//!
//! Every record is addressed by `(scope, RecordKey)`, where the scope is the
//! tree name. A tree owns three kinds of records:
//! - one tree record (`RecordKey::Tree`) holding the degree and variant
//! - one record per node (`RecordKey::Node`), the root always under
//!   [`NodeKey::Root`]
//! - one record per identifier (`RecordKey::Identifier`) for tagged trees
//!
//! Transactions are flat: `begin`/`commit`/`rollback` bracket a unit of work
//! and [`Backend::transact`] joins an already active transaction instead of
//! nesting.
//!
//! [`MemoryBackend`]: crate::storage::MemoryBackend

use serde::{Deserialize, Serialize};

/// Locator of a node record.
///
/// The root is always stored under `Root`, whichever node currently plays
/// that role. Every other node is stored under its own assigned id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKey {
    #[default]
    Root,
    Assigned(u64),
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Assigned(id) => write!(f, "{id}"),
        }
    }
}

/// Key of a record within a tree scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKey {
    /// The tree record (degree and variant).
    Tree,
    /// A node record.
    Node(NodeKey),
    /// An identifier index entry.
    Identifier(String),
}

/// Errors raised by a backend.
#[derive(Debug)]
pub enum BackendError {
    /// A record could not be encoded or decoded.
    Codec(String),
    /// A transaction is already open on another thread.
    TransactionActive,
    /// `commit` or `rollback` without an open transaction.
    NoTransaction,
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Codec(msg) => write!(f, "codec error: {msg}"),
            Self::TransactionActive => write!(f, "another transaction is active"),
            Self::NoTransaction => write!(f, "no transaction is active"),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

/// Abstraction over a transactional record store.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - reads inside a transaction observe that transaction's own writes
/// - `commit` applies every write and delete of the transaction, or none;
///   a failed commit leaves no transaction open
/// - `rollback` discards every write and delete of the transaction
/// - `allocate_id` never returns the same id twice for a scope, and works
///   outside a transaction
pub trait Backend {
    /// Read a single record.
    fn read(&self, scope: &str, key: &RecordKey) -> Result<Option<Vec<u8>>, BackendError>;

    /// Read many records in one round trip. The result is parallel to `keys`.
    fn read_many(
        &self,
        scope: &str,
        keys: &[RecordKey],
    ) -> Result<Vec<Option<Vec<u8>>>, BackendError>;

    /// Write many records in one round trip.
    fn write_many(&self, scope: &str, records: Vec<(RecordKey, Vec<u8>)>)
    -> Result<(), BackendError>;

    /// Delete many records in one round trip. Missing records are ignored.
    fn delete_many(&self, scope: &str, keys: &[RecordKey]) -> Result<(), BackendError>;

    /// Allocate a fresh node id for the scope.
    fn allocate_id(&self, scope: &str) -> Result<u64, BackendError>;

    /// Open a transaction.
    fn begin(&self) -> Result<(), BackendError>;

    /// Commit the open transaction.
    fn commit(&self) -> Result<(), BackendError>;

    /// Discard the open transaction, if any.
    fn rollback(&self);

    /// Whether the calling thread has an open transaction.
    fn in_transaction(&self) -> bool;

    /// Run `work` in a new transaction.
    ///
    /// Commits when `work` returns `Ok`, rolls back when it returns `Err` or
    /// panics.
    fn run_in_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        Self: Sized,
        E: From<BackendError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.begin()?;
        let guard = TransactionGuard::new(self);
        let value = work()?;
        guard.commit()?;
        Ok(value)
    }

    /// Run `work` in the active transaction, or in a new one if none is open.
    fn transact<T, E, F>(&self, work: F) -> Result<T, E>
    where
        Self: Sized,
        E: From<BackendError>,
        F: FnOnce() -> Result<T, E>,
    {
        if self.in_transaction() {
            work()
        } else {
            self.run_in_transaction(work)
        }
    }
}

/// Rolls the transaction back unless it was committed.
struct TransactionGuard<'a, B: Backend> {
    backend: &'a B,
    finished: bool,
}

impl<'a, B: Backend> TransactionGuard<'a, B> {
    const fn new(backend: &'a B) -> Self {
        Self {
            backend,
            finished: false,
        }
    }

    fn commit(mut self) -> Result<(), BackendError> {
        self.finished = true;
        self.backend.commit()
    }
}

impl<B: Backend> Drop for TransactionGuard<'_, B> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("rolling back transaction");
            self.backend.rollback();
        }
    }
}
