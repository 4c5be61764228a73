//! End-to-end tests at the public tree API level.
//!
//! Each test file covers one area of behaviour against an in-memory
//! backend, checking the structural invariants of the stored tree along the
//! way.

#![cfg(test)]


mod test_debug_output;
mod test_identifiers;
mod test_index_access;
mod test_insert;
mod test_random_workload;
