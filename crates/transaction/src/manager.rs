//! Transaction lifecycle: open/commit/abort and the undo/redo stacks
//!
//! One manager per document. At most one transaction is open at a time;
//! nested open calls increment a depth counter instead of stacking real
//! transactions, and only the outermost commit finalizes. Replay (undo,
//! redo, abort) runs under a guard so that nothing mutated during replay is
//! ever recorded again.

use crate::record::ChangeRecord;
use crate::transaction::Transaction;
use std::collections::VecDeque;
use tracing::{debug, info, warn};
use vellum_core::{Error, ObjectName, ObjectStore, Result};

/// Bounds on undo history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoLimits {
    /// Maximum number of transactions kept; oldest evicted first
    pub max_stack_size: usize,
    /// Byte budget over both stacks; 0 means unbounded
    pub memory_limit_bytes: usize,
}

impl Default for UndoLimits {
    fn default() -> Self {
        UndoLimits {
            max_stack_size: 20,
            memory_limit_bytes: 0,
        }
    }
}

/// What a finalized commit, undo or redo affected
///
/// Handed back so the document can re-touch objects and emit events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSummary {
    /// Name of the transaction
    pub name: String,
    /// Every object the transaction mentioned, in record order
    pub affected: Vec<ObjectName>,
    /// Objects created by the transaction
    pub added: Vec<ObjectName>,
    /// Objects removed by the transaction
    pub removed: Vec<ObjectName>,
}

impl TransactionSummary {
    fn of(txn: &Transaction) -> Self {
        TransactionSummary {
            name: txn.name().to_string(),
            affected: txn.affected_objects(),
            added: txn.added_objects(),
            removed: txn.removed_objects(),
        }
    }
}

struct Pending {
    txn: Transaction,
    /// Nested open calls beyond the outermost
    depth: usize,
}

/// Records mutations into transactions and replays them for undo/redo
pub struct TransactionManager {
    undo_stack: VecDeque<Transaction>,
    redo_stack: Vec<Transaction>,
    pending: Option<Pending>,
    replaying: bool,
    next_id: u64,
    limits: UndoLimits,
}

impl TransactionManager {
    /// Create a manager with the given history bounds
    pub fn new(limits: UndoLimits) -> Self {
        TransactionManager {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            pending: None,
            replaying: false,
            next_id: 1,
            limits,
        }
    }

    // === Open / record / commit / abort ===

    /// Open a transaction, or deepen the already-open one
    ///
    /// The outermost name wins; nested opens only bump the depth counter.
    /// Ignored during replay: replayed changes never form new history.
    pub fn open_transaction(&mut self, name: Option<&str>) {
        if self.replaying {
            debug!(target: "vellum::txn", "open_transaction ignored during replay");
            return;
        }
        match &mut self.pending {
            Some(pending) => {
                pending.depth += 1;
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                let txn = Transaction::new(id, name.unwrap_or("unnamed"));
                debug!(target: "vellum::txn", id, name = txn.name(), "Transaction opened");
                self.pending = Some(Pending { txn, depth: 0 });
            }
        }
    }

    /// Capture one mutation
    ///
    /// During replay nothing is recorded. With a transaction open the
    /// record lands there. With no transaction open the mutation still
    /// forks history: a non-empty redo stack is discarded.
    pub fn record(&mut self, change: ChangeRecord) {
        if self.replaying {
            return;
        }
        match &mut self.pending {
            Some(pending) => pending.txn.record(change),
            None => {
                if !self.redo_stack.is_empty() {
                    debug!(target: "vellum::txn", "History forked, redo stack cleared");
                    self.redo_stack.clear();
                }
            }
        }
    }

    /// Close one nesting level; finalize at the outermost
    ///
    /// Finalizing pushes the transaction onto the undo stack, clears the
    /// redo stack and enforces the history bounds. An empty transaction is
    /// dropped silently. Without an open transaction this does nothing.
    pub fn commit_transaction(&mut self) -> Option<TransactionSummary> {
        if self.replaying {
            return None;
        }
        match &mut self.pending {
            None => {
                debug!(target: "vellum::txn", "commit without open transaction ignored");
                return None;
            }
            Some(pending) if pending.depth > 0 => {
                pending.depth -= 1;
                return None;
            }
            Some(_) => {}
        }
        let Some(pending) = self.pending.take() else {
            return None;
        };
        if pending.txn.is_empty() {
            debug!(target: "vellum::txn", name = pending.txn.name(), "Empty transaction dropped");
            return None;
        }
        let summary = TransactionSummary::of(&pending.txn);
        info!(
            target: "vellum::txn",
            name = pending.txn.name(),
            records = pending.txn.len(),
            "Transaction committed"
        );
        self.undo_stack.push_back(pending.txn);
        self.redo_stack.clear();
        self.enforce_limits();
        Some(summary)
    }

    /// Revert everything recorded so far and discard the transaction
    ///
    /// Takes effect at any nesting depth. The recorded changes are undone
    /// last-to-first; a failed revert is propagated, never swallowed.
    pub fn abort_transaction(&mut self, store: &mut ObjectStore) -> Result<Option<TransactionSummary>> {
        if self.replaying {
            return Err(Error::ReplayInProgress);
        }
        let Some(mut pending) = self.pending.take() else {
            warn!(target: "vellum::txn", "abort without open transaction ignored");
            return Ok(None);
        };
        let summary = TransactionSummary::of(&pending.txn);
        self.replaying = true;
        let result = pending.txn.revert(store);
        self.replaying = false;
        result?;
        info!(target: "vellum::txn", name = %summary.name, "Transaction aborted");
        Ok(Some(summary))
    }

    // === Undo / redo ===

    /// Undo the most recent committed transaction
    ///
    /// Returns Ok(None) with no state change when the undo stack is empty.
    /// Rejected while a transaction is open or a replay is running.
    pub fn undo(&mut self, store: &mut ObjectStore) -> Result<Option<TransactionSummary>> {
        if self.replaying {
            return Err(Error::ReplayInProgress);
        }
        if self.pending.is_some() {
            return Err(Error::invalid_operation(
                "cannot undo while a transaction is open",
            ));
        }
        let Some(mut txn) = self.undo_stack.pop_back() else {
            return Ok(None);
        };
        self.replaying = true;
        let result = txn.revert(store);
        self.replaying = false;
        result?;
        let summary = TransactionSummary::of(&txn);
        info!(target: "vellum::txn", name = %summary.name, "Undo performed");
        self.redo_stack.push(txn);
        Ok(Some(summary))
    }

    /// Reapply the most recently undone transaction
    pub fn redo(&mut self, store: &mut ObjectStore) -> Result<Option<TransactionSummary>> {
        if self.replaying {
            return Err(Error::ReplayInProgress);
        }
        if self.pending.is_some() {
            return Err(Error::invalid_operation(
                "cannot redo while a transaction is open",
            ));
        }
        let Some(mut txn) = self.redo_stack.pop() else {
            return Ok(None);
        };
        self.replaying = true;
        let result = txn.reapply(store);
        self.replaying = false;
        result?;
        let summary = TransactionSummary::of(&txn);
        info!(target: "vellum::txn", name = %summary.name, "Redo performed");
        self.undo_stack.push_back(txn);
        Ok(Some(summary))
    }

    // === Introspection ===

    /// Is a transaction open?
    pub fn has_pending_transaction(&self) -> bool {
        self.pending.is_some()
    }

    /// Is an undo/redo/abort replay running right now?
    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// Number of undoable transactions
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of redoable transactions
    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Undo names, most recent first
    pub fn undo_names(&self) -> Vec<String> {
        self.undo_stack
            .iter()
            .rev()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Redo names, most recent first
    pub fn redo_names(&self) -> Vec<String> {
        self.redo_stack
            .iter()
            .rev()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Drop all stored undo and redo history
    pub fn clear_undos(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Estimated byte footprint of both history stacks
    pub fn mem_size(&self) -> usize {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(Transaction::mem_size)
            .sum()
    }

    /// Current history bounds
    pub fn limits(&self) -> UndoLimits {
        self.limits
    }

    /// Replace the stack-size bound and evict immediately if exceeded
    pub fn set_max_stack_size(&mut self, size: usize) {
        self.limits.max_stack_size = size;
        self.enforce_limits();
    }

    /// Replace the byte budget and evict immediately if exceeded
    pub fn set_memory_limit(&mut self, bytes: usize) {
        self.limits.memory_limit_bytes = bytes;
        self.enforce_limits();
    }

    /// Evict oldest transactions until both bounds hold
    ///
    /// The newest transaction always survives, even when it alone exceeds
    /// the byte budget.
    fn enforce_limits(&mut self) {
        while self.undo_stack.len() > self.limits.max_stack_size {
            if let Some(evicted) = self.undo_stack.pop_front() {
                debug!(target: "vellum::txn", name = evicted.name(), "Undo history evicted (stack size)");
            }
        }
        if self.limits.memory_limit_bytes > 0 {
            while self.undo_stack.len() > 1 && self.mem_size() > self.limits.memory_limit_bytes {
                if let Some(evicted) = self.undo_stack.pop_front() {
                    debug!(target: "vellum::txn", name = evicted.name(), "Undo history evicted (memory)");
                }
            }
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        TransactionManager::new(UndoLimits::default())
    }
}
