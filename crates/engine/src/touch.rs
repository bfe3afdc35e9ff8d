//! Touch propagation: marking objects stale along dependency edges
//!
//! Touching an object dirties everything that depends on it, transitively,
//! following inbound edges. Two exceptions:
//! - a dependent whose only links to the touched object are presentational
//!   (`skip_propagation`) is left clean;
//! - an object that is mid-restore is not touched immediately; the touch is
//!   deferred until restore completes, so nothing recomputes against a
//!   partially populated graph.

use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use tracing::debug;
use vellum_core::{DocumentObject, Error, ObjectName, ObjectStore, Result};
use vellum_graph::DependencyGraph;

/// Propagates dirty state and tracks touches deferred during restore
#[derive(Debug, Default)]
pub struct TouchTracker {
    deferred: FxHashSet<ObjectName>,
}

impl TouchTracker {
    /// Create a tracker with no deferred touches
    pub fn new() -> Self {
        TouchTracker::default()
    }

    /// Mark an object and all its transitive dependents stale
    ///
    /// Returns the names actually marked, in propagation order. The graph
    /// must have been rebuilt against `store` first.
    pub fn touch(
        &mut self,
        store: &mut ObjectStore,
        graph: &DependencyGraph,
        name: &ObjectName,
    ) -> Result<Vec<ObjectName>> {
        if !store.contains(name.as_str()) {
            return Err(Error::UnknownObject(name.clone()));
        }
        let mut marked = Vec::new();
        let mut visited: FxHashSet<ObjectName> = FxHashSet::default();
        let mut queue: VecDeque<ObjectName> = VecDeque::new();
        visited.insert(name.clone());
        queue.push_back(name.clone());

        while let Some(current) = queue.pop_front() {
            let Some(obj) = store.get_mut(current.as_str()) else {
                continue;
            };
            if obj.is_restoring() {
                debug!(target: "vellum::recompute", object = %current, "Touch deferred during restore");
                self.deferred.insert(current);
                // Dependents are dirtied when the deferred touch is flushed.
                continue;
            }
            obj.touch();
            marked.push(current.clone());

            for dependent in graph.in_list(current.as_str()) {
                if visited.contains(dependent) {
                    continue;
                }
                let propagates = store
                    .get(dependent.as_str())
                    .is_some_and(|d| d.has_propagating_link_to(&current));
                if propagates {
                    visited.insert(dependent.clone());
                    queue.push_back(dependent.clone());
                }
            }
        }
        Ok(marked)
    }

    /// Apply all touches deferred while objects were restoring
    ///
    /// Call once restore has completed and the restoring flags are cleared.
    pub fn flush_deferred(
        &mut self,
        store: &mut ObjectStore,
        graph: &DependencyGraph,
    ) -> Result<Vec<ObjectName>> {
        let mut pending: Vec<ObjectName> = self.deferred.drain().collect();
        pending.sort_by_key(|n| {
            store
                .get(n.as_str())
                .map(|o| o.creation_index())
                .unwrap_or(u64::MAX)
        });
        let mut marked = Vec::new();
        for name in pending {
            if store.contains(name.as_str()) {
                marked.extend(self.touch(store, graph, &name)?);
            }
        }
        Ok(marked)
    }

    /// Are any touches waiting for restore to finish?
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Is any object in the store stale?
    pub fn is_touched(&self, store: &ObjectStore) -> bool {
        store.iter().any(DocumentObject::is_touched)
    }

    /// Does any object require execution on the next recompute?
    pub fn must_execute(&self, store: &ObjectStore) -> bool {
        store.iter().any(DocumentObject::must_execute)
    }

    /// All stale objects, in creation order
    pub fn touched_objects(&self, store: &ObjectStore) -> Vec<ObjectName> {
        store
            .iter_creation_order()
            .into_iter()
            .filter(|o| o.is_touched())
            .map(|o| o.name().clone())
            .collect()
    }

    /// Clear every dirty flag in the document without executing anything
    pub fn purge_touched(&self, store: &mut ObjectStore) {
        for obj in store.iter_mut() {
            obj.purge_touched();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::Property;

    fn name(s: &str) -> ObjectName {
        ObjectName::from(s)
    }

    fn chain() -> (ObjectStore, DependencyGraph) {
        // C depends on B depends on A
        let mut store = ObjectStore::new();
        store.insert_new(name("A"), "T").unwrap();
        let b = store.insert_new(name("B"), "T").unwrap();
        b.add_property("Base", Property::link(Some(name("A")))).unwrap();
        let c = store.insert_new(name("C"), "T").unwrap();
        c.add_property("Base", Property::link(Some(name("B")))).unwrap();
        let mut graph = DependencyGraph::new();
        graph.rebuild(&store).unwrap();
        (store, graph)
    }

    #[test]
    fn test_touch_propagates_to_transitive_dependents() {
        let (mut store, graph) = chain();
        let mut tracker = TouchTracker::new();
        tracker.purge_touched(&mut store);
        let marked = tracker.touch(&mut store, &graph, &name("A")).unwrap();
        assert_eq!(marked, vec![name("A"), name("B"), name("C")]);
        assert!(store.get("A").unwrap().is_touched());
        assert!(store.get("B").unwrap().is_touched());
        assert!(store.get("C").unwrap().is_touched());
    }

    #[test]
    fn test_touch_leaf_does_not_propagate_down() {
        let (mut store, graph) = chain();
        let mut tracker = TouchTracker::new();
        tracker.purge_touched(&mut store);
        tracker.touch(&mut store, &graph, &name("C")).unwrap();
        assert!(!store.get("A").unwrap().is_touched());
        assert!(!store.get("B").unwrap().is_touched());
        assert!(store.get("C").unwrap().is_touched());
    }

    #[test]
    fn test_presentational_link_stops_propagation() {
        let mut store = ObjectStore::new();
        store.insert_new(name("Box"), "T").unwrap();
        let note = store.insert_new(name("Note"), "T").unwrap();
        note.add_property(
            "Anchor",
            Property::link(Some(name("Box"))).with_skip_propagation(),
        )
        .unwrap();
        let mut graph = DependencyGraph::new();
        graph.rebuild(&store).unwrap();
        let mut tracker = TouchTracker::new();
        tracker.purge_touched(&mut store);
        tracker.touch(&mut store, &graph, &name("Box")).unwrap();
        assert!(store.get("Box").unwrap().is_touched());
        assert!(!store.get("Note").unwrap().is_touched());
    }

    #[test]
    fn test_touch_deferred_while_restoring() {
        let (mut store, graph) = chain();
        let mut tracker = TouchTracker::new();
        tracker.purge_touched(&mut store);
        store.get_mut("B").unwrap().set_restoring(true);
        tracker.touch(&mut store, &graph, &name("A")).unwrap();
        assert!(store.get("A").unwrap().is_touched());
        assert!(!store.get("B").unwrap().is_touched());
        assert!(!store.get("C").unwrap().is_touched());
        assert!(tracker.has_deferred());

        store.get_mut("B").unwrap().set_restoring(false);
        tracker.flush_deferred(&mut store, &graph).unwrap();
        assert!(store.get("B").unwrap().is_touched());
        assert!(store.get("C").unwrap().is_touched());
        assert!(!tracker.has_deferred());
    }

    #[test]
    fn test_purge_touched_clears_document() {
        let (mut store, _graph) = chain();
        let tracker = TouchTracker::new();
        assert!(tracker.is_touched(&store));
        tracker.purge_touched(&mut store);
        assert!(!tracker.is_touched(&store));
        assert!(!tracker.must_execute(&store));
        assert!(tracker.touched_objects(&store).is_empty());
    }

    #[test]
    fn test_touch_unknown_object_fails() {
        let (mut store, graph) = chain();
        let mut tracker = TouchTracker::new();
        assert!(matches!(
            tracker.touch(&mut store, &graph, &name("Ghost")),
            Err(Error::UnknownObject(_))
        ));
    }
}
