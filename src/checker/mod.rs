// src/checker/mod.rs
// =============================================================================
// This module contains all URL checking logic.
//
// Submodules:
// - probe: Sends one HEAD request and decides alive / dead
// - pool: A fixed-size group of workers draining the shared URL queue
//
// This file (mod.rs) is the module root - it re-exports the public API so
// the rest of the app can write `checker::CheckerPool` instead of
// `checker::pool::CheckerPool`.
// =============================================================================

mod pool;
mod probe;

pub use pool::{CheckerPool, ProbeRecord};
pub use probe::{error_chain, CheckOutcome, DeadReason};
