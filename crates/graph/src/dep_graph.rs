//! Derived dependency index over the live object set
//!
//! The graph is never persisted; it is rebuilt from link-property contents
//! whenever the object set or the link topology changed. An edge A -> B
//! exists iff some link property of A currently references B. Edges never
//! point at removed objects: targets absent from the store are tracked
//! separately as external references.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::io::{self, Write};
use tracing::debug;
use vellum_core::{Error, ObjectName, ObjectStore, Result};

type EdgeList = SmallVec<[ObjectName; 4]>;

/// Rebuildable out/in edge index over one document's objects
///
/// `rebuild` is amortized: the store's link revision is remembered and the
/// rebuild is skipped when nothing topology-relevant changed since.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// name -> objects it depends on (its link targets)
    out_edges: FxHashMap<ObjectName, EdgeList>,
    /// name -> objects depending on it
    in_edges: FxHashMap<ObjectName, EdgeList>,
    /// name -> referenced names not present in the store
    external_refs: FxHashMap<ObjectName, Vec<ObjectName>>,
    /// store revision the index was built from
    seen_revision: Option<u64>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    /// Recompute the edge index from current link-property contents
    ///
    /// Idempotent and cheap to call repeatedly: a no-op unless the store's
    /// link revision moved. A self-edge is rejected with
    /// [`Error::SelfReference`] and leaves the previous index untouched.
    pub fn rebuild(&mut self, store: &ObjectStore) -> Result<()> {
        if self.seen_revision == Some(store.link_revision()) {
            return Ok(());
        }

        let mut out_edges: FxHashMap<ObjectName, EdgeList> = FxHashMap::default();
        let mut in_edges: FxHashMap<ObjectName, EdgeList> = FxHashMap::default();
        let mut external_refs: FxHashMap<ObjectName, Vec<ObjectName>> = FxHashMap::default();

        // Creation-order iteration keeps every edge list deterministic.
        for obj in store.iter_creation_order() {
            let name = obj.name().clone();
            out_edges.entry(name.clone()).or_default();
            in_edges.entry(name.clone()).or_default();
            for target in obj.out_links() {
                if *target == name {
                    return Err(Error::SelfReference(name));
                }
                if store.contains(target.as_str()) {
                    let outs = out_edges.entry(name.clone()).or_default();
                    if !outs.contains(target) {
                        outs.push(target.clone());
                    }
                    let ins = in_edges.entry(target.clone()).or_default();
                    if !ins.contains(&name) {
                        ins.push(name.clone());
                    }
                } else {
                    let ext = external_refs.entry(name.clone()).or_default();
                    if !ext.contains(target) {
                        ext.push(target.clone());
                    }
                }
            }
        }

        let edge_count: usize = out_edges.values().map(|e| e.len()).sum();
        debug!(
            target: "vellum::graph",
            nodes = out_edges.len(),
            edges = edge_count,
            revision = store.link_revision(),
            "Dependency graph rebuilt"
        );

        self.out_edges = out_edges;
        self.in_edges = in_edges;
        self.external_refs = external_refs;
        self.seen_revision = Some(store.link_revision());
        Ok(())
    }

    /// Force the next `rebuild` to run regardless of revision
    pub fn invalidate(&mut self) {
        self.seen_revision = None;
    }

    /// Direct dependencies of an object (the objects it links to)
    pub fn out_list(&self, name: &str) -> &[ObjectName] {
        self.out_edges.get(name).map_or(&[], |e| e.as_slice())
    }

    /// Direct dependents of an object (the objects linking to it)
    pub fn in_list(&self, name: &str) -> &[ObjectName] {
        self.in_edges.get(name).map_or(&[], |e| e.as_slice())
    }

    /// External references held by an object (targets not in the store)
    pub fn external_refs(&self, name: &str) -> &[ObjectName] {
        self.external_refs.get(name).map_or(&[], |e| e.as_slice())
    }

    /// Number of nodes in the index
    pub fn node_count(&self) -> usize {
        self.out_edges.len()
    }

    /// Objects nothing depends on, in creation order
    pub fn root_objects(&self, store: &ObjectStore) -> Vec<ObjectName> {
        store
            .iter_creation_order()
            .into_iter()
            .filter(|o| self.in_list(o.name().as_str()).is_empty())
            .map(|o| o.name().clone())
            .collect()
    }

    /// All simple paths from `from` to `to` following out-edges
    ///
    /// Deterministic: edges are traversed in their stored (creation-derived)
    /// order. Returns an empty list when no path exists.
    pub fn paths_by_out_list(&self, from: &ObjectName, to: &ObjectName) -> Vec<Vec<ObjectName>> {
        let mut paths = Vec::new();
        let mut current = vec![from.clone()];
        self.collect_paths(from, to, &mut current, &mut paths);
        paths
    }

    fn collect_paths(
        &self,
        at: &ObjectName,
        to: &ObjectName,
        current: &mut Vec<ObjectName>,
        paths: &mut Vec<Vec<ObjectName>>,
    ) {
        if at == to {
            paths.push(current.clone());
            return;
        }
        for next in self.out_list(at.as_str()) {
            if current.contains(next) {
                continue; // simple paths only
            }
            current.push(next.clone());
            self.collect_paths(next, to, current, paths);
            current.pop();
        }
    }

    /// Write the graph in Graphviz dot format
    pub fn export_graphviz(&self, store: &ObjectStore, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "digraph dependencies {{")?;
        for obj in store.iter_creation_order() {
            writeln!(
                out,
                "    \"{}\" [label=\"{} ({})\"];",
                obj.name(),
                obj.label(),
                obj.type_name()
            )?;
        }
        for obj in store.iter_creation_order() {
            for target in self.out_list(obj.name().as_str()) {
                writeln!(out, "    \"{}\" -> \"{}\";", obj.name(), target)?;
            }
        }
        writeln!(out, "}}")
    }
}
