//! Vellum - parametric document kernel
//!
//! Vellum maintains a graph of named, typed objects whose properties can
//! reference each other, with incremental recomputation, cycle detection
//! and multi-level undo/redo.
//!
//! # Quick Start
//!
//! ```
//! use vellum::{Document, Property};
//!
//! # fn main() -> vellum::Result<()> {
//! let mut doc = Document::new("demo");
//!
//! // Two objects, Pad depending on Sketch
//! let sketch = doc.add_object("Part::Sketch", None)?;
//! let pad = doc.add_object("Part::Pad", None)?;
//! doc.add_property(pad.as_str(), "Base", Property::link(Some(sketch.clone())))?;
//!
//! // Everything new is stale; one pass computes both in dependency order
//! let executed = doc.recompute(None)?;
//! assert_eq!(executed, 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! All mutation goes through the [`Document`] façade so the open
//! transaction and touch propagation capture it uniformly. Internal layers
//! (object store, dependency graph, recompute engine, transaction manager)
//! live in the member crates and are re-exported here.

// Re-export the public API from vellum-document
pub use vellum_document::*;
