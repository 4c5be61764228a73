//! Storage layer.
//!
//! This module provides:
//! - `backend`: the [`Backend`] contract and record addressing
//! - `record`: persisted record types and their encoding
//! - `memory`: an in-memory backend with fault injection

mod backend;
mod memory;
mod record;

pub use backend::{Backend, BackendError, NodeKey, RecordKey};
pub use memory::{FaultConfig, MemoryBackend, MemoryBackendStats};
pub use record::{IndexRecord, TreeKind, TreeRecord, decode, encode};
