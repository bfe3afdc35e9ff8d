//! Error types for the document kernel
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Structural and transaction errors are surfaced synchronously at the call
//! that caused them. Recompute failures are *not* errors in this sense; they
//! travel through the recompute log (see `FailureRecord`).

use crate::types::ObjectName;
use thiserror::Error;

/// Result type alias for document kernel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the document kernel
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// An object with this name already exists in the document
    #[error("an object named '{0}' already exists")]
    DuplicateName(ObjectName),

    /// No object with this name exists in the document
    #[error("no object named '{0}' in this document")]
    UnknownObject(ObjectName),

    /// A link property may not reference its own owner
    #[error("object '{0}' may not link to itself")]
    SelfReference(ObjectName),

    /// Removal rejected because other objects still link to the target
    #[error("cannot remove '{object}': still referenced by {referencers:?}")]
    StillReferenced {
        /// Object whose removal was requested
        object: ObjectName,
        /// Objects that still hold links to it
        referencers: Vec<ObjectName>,
    },

    /// The dependency graph contains a directed cycle
    #[error("dependency cycle through {0:?}")]
    CyclicDependency(Vec<ObjectName>),

    /// No property with this name on the given object
    #[error("no property named '{property}' on object '{object}'")]
    UnknownProperty {
        /// Owning object
        object: ObjectName,
        /// Requested property name
        property: String,
    },

    /// A property with this name already exists on the given object
    #[error("a property named '{property}' already exists on object '{object}'")]
    DuplicateProperty {
        /// Owning object
        object: ObjectName,
        /// Requested property name
        property: String,
    },

    /// The property rejects mutation
    #[error("property '{property}' of '{object}' is read-only")]
    ReadOnlyProperty {
        /// Owning object
        object: ObjectName,
        /// Property name
        property: String,
    },

    /// Operation requires an open transaction but none is open
    #[error("no transaction is open")]
    NoOpenTransaction,

    /// Operation attempted while an undo/redo replay is in progress
    #[error("transaction replay in progress")]
    ReplayInProgress,

    /// Invalid operation or state
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Shorthand for `Error::InvalidOperation`
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Error::InvalidOperation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_duplicate_name() {
        let err = Error::DuplicateName(ObjectName::from("Box"));
        let msg = err.to_string();
        assert!(msg.contains("already exists"));
        assert!(msg.contains("Box"));
    }

    #[test]
    fn test_error_display_still_referenced() {
        let err = Error::StillReferenced {
            object: ObjectName::from("Sketch"),
            referencers: vec![ObjectName::from("Pad")],
        };
        let msg = err.to_string();
        assert!(msg.contains("Sketch"));
        assert!(msg.contains("Pad"));
    }

    #[test]
    fn test_error_display_cycle() {
        let err = Error::CyclicDependency(vec![ObjectName::from("A"), ObjectName::from("B")]);
        let msg = err.to_string();
        assert!(msg.contains("cycle"));
        assert!(msg.contains("A"));
        assert!(msg.contains("B"));
    }

    #[test]
    fn test_error_display_self_reference() {
        let err = Error::SelfReference(ObjectName::from("Loop"));
        assert!(err.to_string().contains("may not link to itself"));
    }

    #[test]
    fn test_error_pattern_matching() {
        let err = Error::UnknownProperty {
            object: ObjectName::from("Box"),
            property: "Length".to_string(),
        };
        match err {
            Error::UnknownProperty { object, property } => {
                assert_eq!(object.as_str(), "Box");
                assert_eq!(property, "Length");
            }
            _ => panic!("Wrong error variant"),
        }
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
