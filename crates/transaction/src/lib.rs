//! Transactional undo/redo for the vellum document kernel
//!
//! Mutations routed through the document API are captured as change
//! records; committed transactions move between bounded undo and redo
//! stacks and replay themselves to revert or reapply history.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod record;
pub mod transaction;

pub use manager::{TransactionManager, TransactionSummary, UndoLimits};
pub use record::ChangeRecord;
pub use transaction::Transaction;
