//! Topological ordering and cycle detection
//!
//! Classic three-color depth-first traversal: a gray node reached again is a
//! back edge, i.e. a cycle. The same pass produces the dependency-first
//! order, so detection and ordering cost one O(V+E) traversal.
//!
//! Ties among independent objects are broken by creation index, making the
//! order reproducible across runs with identical input.

use crate::dep_graph::DependencyGraph;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use vellum_core::{Error, ObjectName, ObjectStore, Result};

const WHITE: u8 = 0;
const GRAY: u8 = 1;
const BLACK: u8 = 2;

struct Frame {
    name: ObjectName,
    deps: Vec<ObjectName>,
    next: usize,
}

/// Result of a transitive dependency query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyList {
    /// The closure, external names first, then in-document objects
    pub objects: Vec<ObjectName>,
    /// True if any external (out-of-document) reference was seen, reported
    /// regardless of whether externals were excluded from `objects`
    pub has_external: bool,
}

impl DependencyGraph {
    /// Dependency-first order: every object appears after everything it
    /// depends on
    ///
    /// With a subset, the order covers exactly those objects and edges
    /// among them. On a cycle the sort fails with
    /// [`Error::CyclicDependency`] naming the implicated objects; it never
    /// produces a partial order.
    ///
    /// The graph must have been rebuilt against `store` first.
    pub fn topological_sort(
        &self,
        store: &ObjectStore,
        subset: Option<&[ObjectName]>,
    ) -> Result<Vec<ObjectName>> {
        let nodes = self.collect_nodes(store, subset)?;
        let node_set: FxHashSet<&ObjectName> = nodes.iter().collect();
        let creation_index = |n: &ObjectName| {
            store
                .get(n.as_str())
                .map(|o| o.creation_index())
                .unwrap_or(u64::MAX)
        };
        let deps_of = |n: &ObjectName| -> Vec<ObjectName> {
            let mut deps: Vec<ObjectName> = self
                .out_list(n.as_str())
                .iter()
                .filter(|d| node_set.contains(d))
                .cloned()
                .collect();
            deps.sort_by_key(&creation_index);
            deps
        };

        let mut color: FxHashMap<ObjectName, u8> = FxHashMap::default();
        let mut order: Vec<ObjectName> = Vec::with_capacity(nodes.len());
        let mut stack: Vec<Frame> = Vec::new();

        for root in &nodes {
            if *color.get(root).unwrap_or(&WHITE) != WHITE {
                continue;
            }
            color.insert(root.clone(), GRAY);
            stack.push(Frame {
                name: root.clone(),
                deps: deps_of(root),
                next: 0,
            });
            while !stack.is_empty() {
                let next_dep = {
                    let Some(frame) = stack.last_mut() else { break };
                    if frame.next < frame.deps.len() {
                        let d = frame.deps[frame.next].clone();
                        frame.next += 1;
                        Some(d)
                    } else {
                        None
                    }
                };
                match next_dep {
                    Some(dep) => match *color.get(&dep).unwrap_or(&WHITE) {
                        WHITE => {
                            color.insert(dep.clone(), GRAY);
                            let deps = deps_of(&dep);
                            stack.push(Frame {
                                name: dep,
                                deps,
                                next: 0,
                            });
                        }
                        GRAY => {
                            // Back edge: everything from the gray node to
                            // the top of the stack is on the cycle.
                            let pos = stack
                                .iter()
                                .position(|f| f.name == dep)
                                .unwrap_or(0);
                            let members: Vec<ObjectName> =
                                stack[pos..].iter().map(|f| f.name.clone()).collect();
                            return Err(Error::CyclicDependency(members));
                        }
                        _ => {}
                    },
                    None => {
                        if let Some(done) = stack.pop() {
                            color.insert(done.name.clone(), BLACK);
                            order.push(done.name);
                        }
                    }
                }
            }
        }
        Ok(order)
    }

    /// True if the full graph contains a directed cycle
    pub fn has_cycle(&self, store: &ObjectStore) -> bool {
        self.topological_sort(store, None).is_err()
    }

    /// Objects implicated in a cycle, or None when the graph is acyclic
    pub fn cycle_members(&self, store: &ObjectStore) -> Option<Vec<ObjectName>> {
        match self.topological_sort(store, None) {
            Err(Error::CyclicDependency(members)) => Some(members),
            _ => None,
        }
    }

    /// Transitive closure of everything the given objects depend on
    ///
    /// Includes the given objects themselves. External names (referenced
    /// but not present in the store) come first in first-seen order, then
    /// the in-document closure in creation order, or in dependency-first
    /// order when `sorted` is set. With `exclude_external` the external
    /// names are omitted from the result; `has_external` still reports
    /// them.
    pub fn dependency_list(
        &self,
        store: &ObjectStore,
        roots: &[ObjectName],
        exclude_external: bool,
        sorted: bool,
    ) -> Result<DependencyList> {
        let mut visited: FxHashSet<ObjectName> = FxHashSet::default();
        let mut queue: VecDeque<ObjectName> = VecDeque::new();
        for root in roots {
            if !store.contains(root.as_str()) {
                return Err(Error::UnknownObject(root.clone()));
            }
            if visited.insert(root.clone()) {
                queue.push_back(root.clone());
            }
        }

        let mut externals: Vec<ObjectName> = Vec::new();
        while let Some(name) = queue.pop_front() {
            for dep in self.out_list(name.as_str()) {
                if visited.insert(dep.clone()) {
                    queue.push_back(dep.clone());
                }
            }
            for ext in self.external_refs(name.as_str()) {
                if !externals.contains(ext) {
                    externals.push(ext.clone());
                }
            }
        }

        let has_external = !externals.is_empty();
        let mut members: Vec<ObjectName> = visited.into_iter().collect();
        let in_store = if sorted {
            self.topological_sort(store, Some(&members))?
        } else {
            members.sort_by_key(|n| {
                store
                    .get(n.as_str())
                    .map(|o| o.creation_index())
                    .unwrap_or(u64::MAX)
            });
            members
        };

        let mut objects = if exclude_external { Vec::new() } else { externals };
        objects.extend(in_store);
        Ok(DependencyList {
            objects,
            has_external,
        })
    }

    fn collect_nodes(
        &self,
        store: &ObjectStore,
        subset: Option<&[ObjectName]>,
    ) -> Result<Vec<ObjectName>> {
        match subset {
            Some(names) => {
                let mut seen: FxHashSet<ObjectName> = FxHashSet::default();
                let mut nodes: Vec<ObjectName> = Vec::with_capacity(names.len());
                for name in names {
                    if !store.contains(name.as_str()) {
                        return Err(Error::UnknownObject(name.clone()));
                    }
                    if seen.insert(name.clone()) {
                        nodes.push(name.clone());
                    }
                }
                nodes.sort_by_key(|n| {
                    store
                        .get(n.as_str())
                        .map(|o| o.creation_index())
                        .unwrap_or(u64::MAX)
                });
                Ok(nodes)
            }
            None => Ok(store.names_creation_order()),
        }
    }
}
