//! Recompute engine for the vellum document kernel
//!
//! Touch propagation along dependency edges, and ordered incremental
//! execution of stale objects with partial-failure semantics.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod recompute;
pub mod touch;

pub use recompute::{CancelToken, NoopExecutor, ObjectExecutor, RecomputeEngine};
pub use touch::TouchTracker;
