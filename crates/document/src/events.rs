//! Typed document notifications
//!
//! Fire-and-forget events consumed by rendering, UI and scripting layers.
//! Every event is emitted strictly after the state change it describes is
//! durable, in observer registration order. The kernel's correctness never
//! depends on what a listener does.

use vellum_core::ObjectName;

/// One document notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// An object was added to the document
    ObjectAdded {
        /// The new object
        object: ObjectName,
    },
    /// An object was removed from the document
    ObjectRemoved {
        /// The removed object
        object: ObjectName,
    },
    /// A property of an object changed through the mutation API
    ObjectChanged {
        /// Owning object
        object: ObjectName,
        /// Name of the changed property
        property: String,
    },
    /// An object was explicitly marked stale
    ObjectTouched {
        /// The touched object
        object: ObjectName,
    },
    /// A transaction was committed onto the undo stack
    TransactionCommitted {
        /// Transaction name
        name: String,
        /// Objects created within the transaction
        added: Vec<ObjectName>,
    },
    /// A committed transaction removed objects
    TransactionRemoved {
        /// Transaction name
        name: String,
        /// Objects removed within the transaction
        removed: Vec<ObjectName>,
    },
    /// An open transaction was aborted and its changes reverted
    TransactionAborted {
        /// Transaction name
        name: String,
    },
    /// An undo step was performed
    UndoPerformed {
        /// Name of the undone transaction
        name: String,
    },
    /// A redo step was performed
    RedoPerformed {
        /// Name of the redone transaction
        name: String,
    },
    /// A recompute pass finished
    RecomputeFinished {
        /// Number of objects actually executed
        executed: usize,
    },
}

/// Receiver of document notifications
///
/// Observers are observational only; they get a shared reference and cannot
/// mutate the document from inside a notification.
pub trait DocumentObserver: Send + Sync {
    /// Called after each state change, in registration order
    fn notify(&self, event: &DocumentEvent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Collector {
        seen: Mutex<Vec<DocumentEvent>>,
    }

    impl DocumentObserver for Collector {
        fn notify(&self, event: &DocumentEvent) {
            self.seen.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_observer_collects_events() {
        let collector = Collector {
            seen: Mutex::new(Vec::new()),
        };
        collector.notify(&DocumentEvent::RecomputeFinished { executed: 3 });
        assert_eq!(
            collector.seen.lock().unwrap().as_slice(),
            &[DocumentEvent::RecomputeFinished { executed: 3 }]
        );
    }
}
