//! Dependency graph for the vellum document kernel
//!
//! A derived, rebuildable index over the live object set: outbound links
//! (what an object depends on), inbound links (what depends on it), cycle
//! detection and deterministic topological ordering.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dep_graph;
pub mod toposort;

pub use dep_graph::DependencyGraph;
pub use toposort::DependencyList;
