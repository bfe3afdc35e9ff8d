//! Incremental recomputation over the dependency graph
//!
//! The engine walks objects in dependency-first order and runs each stale
//! object's execute callback. Failure semantics:
//! - a recoverable failure marks the object errored and blocks its
//!   transitive dependents, while independent siblings keep executing;
//! - a fatal failure halts the pass immediately;
//! - a cyclic graph executes nothing at all, because a cycle has no
//!   well-defined execution order.
//!
//! The failure log is replaced wholesale on every pass.

use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vellum_core::{
    DocumentObject, Error, ExecuteOutcome, FailureKind, FailureRecord, ObjectName, ObjectStore,
    Result,
};
use vellum_graph::DependencyGraph;

/// Per-object execute callback
///
/// The kernel does not interpret property values; whatever "executing" an
/// object means is supplied by the caller through this trait, usually keyed
/// by object type.
pub trait ObjectExecutor {
    /// Recompute one object from its current inputs
    fn execute(&mut self, obj: &mut DocumentObject) -> ExecuteOutcome;
}

/// Executor that always succeeds; used for types with no registered executor
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutor;

impl ObjectExecutor for NoopExecutor {
    fn execute(&mut self, _obj: &mut DocumentObject) -> ExecuteOutcome {
        ExecuteOutcome::Success
    }
}

/// Cooperative cancellation for long recompute passes
///
/// Cancellation is honored between objects, never mid-object. Objects not
/// yet executed remain touched and run on the next pass.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Ask the running pass to stop after the current object
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// Drives execution of stale objects and owns the recompute log
#[derive(Debug, Default)]
pub struct RecomputeEngine {
    log: Vec<FailureRecord>,
    cancel: CancelToken,
}

impl RecomputeEngine {
    /// Create an engine with an empty log
    pub fn new() -> Self {
        RecomputeEngine::default()
    }

    /// Failure records from the most recent pass
    pub fn log(&self) -> &[FailureRecord] {
        &self.log
    }

    /// Failure message for one object from the most recent pass
    pub fn error_description(&self, name: &str) -> Option<&str> {
        self.log
            .iter()
            .find(|r| r.object.as_str() == name)
            .map(|r| r.message.as_str())
    }

    /// Token callers can use to stop a pass between objects
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Recompute all stale objects (or a subset) in dependency-first order
    ///
    /// Returns the number of objects actually executed. Executing an object
    /// re-dirties its dependents, so a pass naturally flows downstream
    /// through the graph.
    pub fn recompute(
        &mut self,
        store: &mut ObjectStore,
        graph: &mut DependencyGraph,
        subset: Option<&[ObjectName]>,
        executor: &mut dyn ObjectExecutor,
    ) -> Result<usize> {
        self.cancel.reset();
        graph.rebuild(store)?;
        self.log.clear();

        let order = match graph.topological_sort(store, subset) {
            Ok(order) => order,
            Err(Error::CyclicDependency(members)) => {
                warn!(
                    target: "vellum::recompute",
                    members = ?members,
                    "Dependency cycle detected, nothing recomputed"
                );
                let message = format!("dependency cycle through {:?}", members);
                for member in &members {
                    self.log.push(FailureRecord::new(
                        member.clone(),
                        message.clone(),
                        FailureKind::Cyclic,
                    ));
                }
                return Ok(0);
            }
            Err(other) => return Err(other),
        };

        let mut executed = 0usize;
        let mut blocked: FxHashSet<ObjectName> = FxHashSet::default();

        for name in order {
            if self.cancel.is_cancelled() {
                info!(target: "vellum::recompute", "Recompute cancelled, remaining objects stay touched");
                break;
            }
            if blocked.contains(&name) {
                self.log.push(FailureRecord::new(
                    name.clone(),
                    "not executed because a dependency failed",
                    FailureKind::Blocked,
                ));
                continue;
            }
            let Some(obj) = store.get_mut(name.as_str()) else {
                continue;
            };
            if !obj.must_execute() {
                continue;
            }
            debug!(target: "vellum::recompute", object = %name, "Executing");
            match executor.execute(obj) {
                ExecuteOutcome::Success => {
                    obj.purge_touched();
                    obj.clear_error();
                    executed += 1;
                    self.dirty_dependents(store, graph, &name);
                }
                ExecuteOutcome::Recoverable(message) => {
                    obj.set_error(message.clone());
                    warn!(target: "vellum::recompute", object = %name, error = %message, "Execute failed");
                    self.log
                        .push(FailureRecord::new(name.clone(), message, FailureKind::Failed));
                    block_dependents(store, graph, &name, &mut blocked);
                }
                ExecuteOutcome::Fatal(message) => {
                    obj.set_error(message.clone());
                    warn!(target: "vellum::recompute", object = %name, error = %message, "Fatal execute failure, aborting pass");
                    self.log
                        .push(FailureRecord::new(name.clone(), message, FailureKind::Fatal));
                    break;
                }
            }
        }

        info!(
            target: "vellum::recompute",
            executed,
            failures = self.log.len(),
            "Recompute finished"
        );
        Ok(executed)
    }

    /// Execute exactly one object immediately
    ///
    /// With `recursive`, stale dependencies are recomputed first in
    /// dependency order. The target itself runs unconditionally, stale or
    /// not. Log entries for the objects executed here are replaced; other
    /// entries from the last batch pass are kept.
    pub fn recompute_feature(
        &mut self,
        store: &mut ObjectStore,
        graph: &mut DependencyGraph,
        name: &ObjectName,
        recursive: bool,
        executor: &mut dyn ObjectExecutor,
    ) -> Result<()> {
        graph.rebuild(store)?;
        if !store.contains(name.as_str()) {
            return Err(Error::UnknownObject(name.clone()));
        }

        let targets: Vec<ObjectName> = if recursive {
            graph
                .dependency_list(store, std::slice::from_ref(name), true, true)?
                .objects
        } else {
            vec![name.clone()]
        };

        let affected: FxHashSet<&ObjectName> = targets.iter().collect();
        self.log.retain(|r| !affected.contains(&r.object));

        for target in &targets {
            let unconditional = target == name;
            let Some(obj) = store.get_mut(target.as_str()) else {
                continue;
            };
            if !unconditional && !obj.must_execute() {
                continue;
            }
            debug!(target: "vellum::recompute", object = %target, "Executing single feature");
            match executor.execute(obj) {
                ExecuteOutcome::Success => {
                    obj.purge_touched();
                    obj.clear_error();
                    self.dirty_dependents(store, graph, target);
                }
                ExecuteOutcome::Recoverable(message) => {
                    obj.set_error(message.clone());
                    self.log.push(FailureRecord::new(
                        target.clone(),
                        message,
                        FailureKind::Failed,
                    ));
                    if unconditional {
                        break;
                    }
                }
                ExecuteOutcome::Fatal(message) => {
                    obj.set_error(message.clone());
                    self.log.push(FailureRecord::new(
                        target.clone(),
                        message,
                        FailureKind::Fatal,
                    ));
                    break;
                }
            }
        }
        Ok(())
    }

    /// A successful execute changes the object's outputs, so every
    /// dependent reachable through a propagating link becomes stale.
    fn dirty_dependents(
        &self,
        store: &mut ObjectStore,
        graph: &DependencyGraph,
        name: &ObjectName,
    ) {
        let dependents: Vec<ObjectName> = graph.in_list(name.as_str()).to_vec();
        for dependent in dependents {
            if let Some(dep) = store.get_mut(dependent.as_str()) {
                if dep.has_propagating_link_to(name) {
                    dep.touch();
                }
            }
        }
    }
}

/// Collect every transitive dependent reachable through propagating links
fn block_dependents(
    store: &ObjectStore,
    graph: &DependencyGraph,
    failed: &ObjectName,
    blocked: &mut FxHashSet<ObjectName>,
) {
    let mut queue: VecDeque<ObjectName> = VecDeque::new();
    queue.push_back(failed.clone());
    while let Some(current) = queue.pop_front() {
        for dependent in graph.in_list(current.as_str()) {
            if blocked.contains(dependent) {
                continue;
            }
            let propagates = store
                .get(dependent.as_str())
                .is_some_and(|d| d.has_propagating_link_to(&current));
            if propagates {
                blocked.insert(dependent.clone());
                queue.push_back(dependent.clone());
            }
        }
    }
}
