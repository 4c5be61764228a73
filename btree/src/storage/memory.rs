//! In-memory backend for tests and embedding.
//!
//! This module provides an in-memory implementation of the [`Backend`] trait
//! with support for fault injection:
//! - read and write errors
//! - commit failures (random or on demand)
//!
//! Writes made inside a transaction are kept in a pending overlay and only
//! become visible to other readers when the transaction commits.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::backend::{Backend, BackendError, RecordKey};

type ScopedKey = (String, RecordKey);

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write or delete error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a commit failure (0.0 - 1.0).
    pub commit_error_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults.
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Create a fault config that only fails commits, with the given rate.
    #[must_use]
    pub fn commit_failures(rate: f64) -> Self {
        Self {
            commit_error_rate: rate,
            ..Self::default()
        }
    }
}

/// Statistics about backend operations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryBackendStats {
    /// Number of `read`/`read_many` calls.
    pub read_calls: u64,
    /// Number of records requested by reads.
    pub records_read: u64,
    /// Number of records written.
    pub records_written: u64,
    /// Number of records deleted.
    pub records_deleted: u64,
    /// Number of committed transactions.
    pub commits: u64,
    /// Number of rolled back transactions, including failed commits.
    pub rollbacks: u64,
    /// Number of allocated node ids.
    pub ids_allocated: u64,
    /// Number of injected faults.
    pub injected_faults: u64,
}

/// Writes of an open transaction. `None` marks a delete.
struct PendingTransaction {
    owner: ThreadId,
    writes: BTreeMap<ScopedKey, Option<Vec<u8>>>,
}

struct MemoryState {
    records: BTreeMap<ScopedKey, Vec<u8>>,
    transaction: Option<PendingTransaction>,
    next_ids: HashMap<String, u64>,
    fault_config: FaultConfig,
    fail_next_commit: bool,
    rng: StdRng,
    stats: MemoryBackendStats,
}

impl MemoryState {
    fn owns_transaction(&self) -> bool {
        self.transaction
            .as_ref()
            .is_some_and(|txn| txn.owner == thread::current().id())
    }

    /// Check if a fault should be injected based on the given rate.
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        let inject = self.rng.random::<f64>() < rate;
        if inject {
            self.stats.injected_faults += 1;
        }
        inject
    }

    fn lookup(&self, key: &ScopedKey) -> Option<Vec<u8>> {
        if self.owns_transaction()
            && let Some(pending) = self.transaction.as_ref().and_then(|txn| txn.writes.get(key))
        {
            return pending.clone();
        }
        self.records.get(key).cloned()
    }

    /// Apply a write or delete, buffered when a transaction is open.
    fn apply(&mut self, key: ScopedKey, value: Option<Vec<u8>>) -> Result<(), BackendError> {
        match &mut self.transaction {
            Some(txn) if txn.owner == thread::current().id() => {
                txn.writes.insert(key, value);
            }
            Some(_) => return Err(BackendError::TransactionActive),
            None => match value {
                Some(bytes) => {
                    self.records.insert(key, bytes);
                }
                None => {
                    self.records.remove(&key);
                }
            },
        }
        Ok(())
    }
}

/// In-memory [`Backend`] implementation.
///
/// # Thread Safety
///
/// All state sits behind a mutex. A transaction belongs to the thread that
/// opened it; other threads see only committed records and cannot write
/// until it finishes.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    /// Create an empty backend without fault injection.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(0, FaultConfig::default())
    }

    /// Create an empty backend with fault injection.
    ///
    /// The seed makes the sequence of injected faults reproducible.
    #[must_use]
    pub fn with_config(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                records: BTreeMap::new(),
                transaction: None,
                next_ids: HashMap::new(),
                fault_config,
                fail_next_commit: false,
                rng: StdRng::seed_from_u64(seed),
                stats: MemoryBackendStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update the fault configuration.
    pub fn set_fault_config(&self, config: FaultConfig) {
        self.lock().fault_config = config;
    }

    /// Make the next commit fail and discard its writes.
    pub fn fail_next_commit(&self) {
        self.lock().fail_next_commit = true;
    }

    /// Get a snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> MemoryBackendStats {
        self.lock().stats.clone()
    }

    /// Reset statistics.
    pub fn reset_stats(&self) {
        self.lock().stats = MemoryBackendStats::default();
    }

    /// Committed record keys of a scope, in order.
    #[must_use]
    pub fn keys(&self, scope: &str) -> Vec<RecordKey> {
        self.lock()
            .records
            .keys()
            .filter(|(s, _)| s == scope)
            .map(|(_, key)| key.clone())
            .collect()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn read(&self, scope: &str, key: &RecordKey) -> Result<Option<Vec<u8>>, BackendError> {
        let mut state = self.lock();
        state.stats.read_calls += 1;
        state.stats.records_read += 1;
        let rate = state.fault_config.read_error_rate;
        if state.should_inject_fault(rate) {
            tracing::warn!("injecting read fault for {scope}/{key:?}");
            return Err(BackendError::InjectedFault("read".to_string()));
        }
        Ok(state.lookup(&(scope.to_string(), key.clone())))
    }

    fn read_many(
        &self,
        scope: &str,
        keys: &[RecordKey],
    ) -> Result<Vec<Option<Vec<u8>>>, BackendError> {
        let mut state = self.lock();
        state.stats.read_calls += 1;
        state.stats.records_read += keys.len() as u64;
        let rate = state.fault_config.read_error_rate;
        if state.should_inject_fault(rate) {
            tracing::warn!("injecting read fault for {} records in {scope}", keys.len());
            return Err(BackendError::InjectedFault("read_many".to_string()));
        }
        Ok(keys
            .iter()
            .map(|key| state.lookup(&(scope.to_string(), key.clone())))
            .collect())
    }

    fn write_many(
        &self,
        scope: &str,
        records: Vec<(RecordKey, Vec<u8>)>,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        let rate = state.fault_config.write_error_rate;
        if state.should_inject_fault(rate) {
            tracing::warn!("injecting write fault for {} records in {scope}", records.len());
            return Err(BackendError::InjectedFault("write_many".to_string()));
        }
        state.stats.records_written += records.len() as u64;
        for (key, bytes) in records {
            state.apply((scope.to_string(), key), Some(bytes))?;
        }
        Ok(())
    }

    fn delete_many(&self, scope: &str, keys: &[RecordKey]) -> Result<(), BackendError> {
        let mut state = self.lock();
        let rate = state.fault_config.write_error_rate;
        if state.should_inject_fault(rate) {
            tracing::warn!("injecting delete fault for {} records in {scope}", keys.len());
            return Err(BackendError::InjectedFault("delete_many".to_string()));
        }
        state.stats.records_deleted += keys.len() as u64;
        for key in keys {
            state.apply((scope.to_string(), key.clone()), None)?;
        }
        Ok(())
    }

    fn allocate_id(&self, scope: &str) -> Result<u64, BackendError> {
        let mut state = self.lock();
        state.stats.ids_allocated += 1;
        let next = state.next_ids.entry(scope.to_string()).or_insert(1);
        let id = *next;
        *next += 1;
        Ok(id)
    }

    fn begin(&self) -> Result<(), BackendError> {
        let mut state = self.lock();
        if state.transaction.is_some() {
            return Err(BackendError::TransactionActive);
        }
        state.transaction = Some(PendingTransaction {
            owner: thread::current().id(),
            writes: BTreeMap::new(),
        });
        Ok(())
    }

    fn commit(&self) -> Result<(), BackendError> {
        let mut state = self.lock();
        if !state.owns_transaction() {
            return Err(BackendError::NoTransaction);
        }
        let Some(txn) = state.transaction.take() else {
            return Err(BackendError::NoTransaction);
        };

        let rate = state.fault_config.commit_error_rate;
        let forced = std::mem::take(&mut state.fail_next_commit);
        if forced {
            state.stats.injected_faults += 1;
        }
        if forced || state.should_inject_fault(rate) {
            tracing::warn!("injecting commit fault, discarding {} writes", txn.writes.len());
            state.stats.rollbacks += 1;
            return Err(BackendError::InjectedFault("commit".to_string()));
        }

        for (key, value) in txn.writes {
            match value {
                Some(bytes) => {
                    state.records.insert(key, bytes);
                }
                None => {
                    state.records.remove(&key);
                }
            }
        }
        state.stats.commits += 1;
        Ok(())
    }

    fn rollback(&self) {
        let mut state = self.lock();
        if state.owns_transaction() {
            state.transaction = None;
            state.stats.rollbacks += 1;
        }
    }

    fn in_transaction(&self) -> bool {
        self.lock().owns_transaction()
    }
}
