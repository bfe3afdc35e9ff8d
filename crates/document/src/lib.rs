//! Document façade of the vellum parametric kernel
//!
//! The [`Document`] is the composition root: it owns the object set, the
//! dependency graph, the recompute engine and the transaction manager, and
//! exposes the single mutation API everything external calls through.
//!
//! # Quick start
//!
//! ```ignore
//! use vellum_document::{Document, Property, PropertyData, ObjectName, Value};
//!
//! let mut doc = Document::new("demo");
//! let sketch = doc.add_object("Part::Sketch", None)?;
//! let pad = doc.add_object("Part::Pad", None)?;
//! doc.add_property(pad.as_str(), "Base", Property::link(Some(sketch.clone())))?;
//! let executed = doc.recompute(None)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod document;
pub mod events;
pub mod persist;

pub use config::DocumentConfig;
pub use document::{Document, DocumentMeta};
pub use events::{DocumentEvent, DocumentObserver};
pub use persist::{ObjectReader, ObjectWriter, SnapshotBuffer};

// Re-export the kernel vocabulary so one dependency is enough downstream.
pub use vellum_core::{
    DocumentObject, Error, ExecuteOutcome, FailureKind, FailureRecord, ObjectName, ObjectSnapshot,
    Property, PropertyData, Result, Value,
};
pub use vellum_engine::{CancelToken, NoopExecutor, ObjectExecutor};
pub use vellum_graph::DependencyList;
pub use vellum_transaction::UndoLimits;
