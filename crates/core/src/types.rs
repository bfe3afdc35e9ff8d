//! Identity and status types shared across the kernel
//!
//! - ObjectName: unique, stable object identity within one document
//! - ExecuteOutcome: result of one object's execute callback
//! - FailureKind / FailureRecord: entries of the recompute log

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Unique name of a document object
///
/// Names are unique within one document and stable for the object's lifetime.
/// All object-to-object references in the kernel are weak, name-based lookups
/// revalidated against the document on every use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectName(String);

impl ObjectName {
    /// Create a name from anything string-like
    pub fn new(name: impl Into<String>) -> Self {
        ObjectName(name.into())
    }

    /// View as `&str`
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectName {
    fn from(s: &str) -> Self {
        ObjectName(s.to_string())
    }
}

impl From<String> for ObjectName {
    fn from(s: String) -> Self {
        ObjectName(s)
    }
}

// Allows FxHashMap<ObjectName, _>::get(&str) lookups without allocation.
impl Borrow<str> for ObjectName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ObjectName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ObjectName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Result of running one object's execute callback
///
/// A `Recoverable` failure marks the object errored but lets independent
/// siblings continue; descendants of the failed object are blocked. A `Fatal`
/// failure halts the whole recompute pass immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Execution succeeded; touched and error state are cleared
    Success,
    /// Execution failed but siblings may continue
    Recoverable(String),
    /// Execution failed in a way that invalidates the whole pass
    Fatal(String),
}

/// Classification of one recompute log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The object's own execute callback failed recoverably
    Failed,
    /// The object's execute callback signalled an unrecoverable condition
    Fatal,
    /// An ancestor failed, so this object was skipped without executing
    Blocked,
    /// The object is part of a dependency cycle; nothing was executed
    Cyclic,
}

/// One entry of the recompute log
///
/// The log is replaced wholesale on every recompute pass; it never
/// accumulates across calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Object the entry is about
    pub object: ObjectName,
    /// Human-readable failure message
    pub message: String,
    /// What kind of failure this is
    pub kind: FailureKind,
}

impl FailureRecord {
    /// Create a new failure record
    pub fn new(object: ObjectName, message: impl Into<String>, kind: FailureKind) -> Self {
        FailureRecord {
            object,
            message: message.into(),
            kind,
        }
    }
}
