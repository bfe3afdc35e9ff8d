//! The document: composition root and single mutation API
//!
//! The document owns the object set, the dependency graph, the recompute
//! engine and the transaction manager. Every mutation from outside goes
//! through this API so the open transaction and touch propagation capture
//! it uniformly; callbacks and scripts must never bypass it.
//!
//! Single-writer model: callers serialize all mutation externally. The
//! document holds no internal locks apart from the observer list.

use crate::config::DocumentConfig;
use crate::events::{DocumentEvent, DocumentObserver};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use vellum_core::{
    reject_self_reference, DocumentObject, Error, ExecuteOutcome, FailureRecord, ObjectName,
    ObjectStore, Property, PropertyData, Result,
};
use vellum_engine::{CancelToken, NoopExecutor, ObjectExecutor, RecomputeEngine, TouchTracker};
use vellum_graph::{DependencyGraph, DependencyList};
use vellum_transaction::{ChangeRecord, TransactionManager, TransactionSummary};

/// Identity and bookkeeping metadata of one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Short document name
    pub name: String,
    /// Display label
    pub label: String,
    /// Stable unique identifier
    pub uid: Uuid,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last mutation
    pub last_modified_at: DateTime<Utc>,
}

impl DocumentMeta {
    fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        DocumentMeta {
            label: name.clone(),
            name,
            uid: Uuid::new_v4(),
            created_at: now,
            last_modified_at: now,
        }
    }

    fn touch_modified(&mut self) {
        self.last_modified_at = Utc::now();
    }
}

/// Per-object execute dispatch with transaction recording
///
/// Looks up the executor registered for the object's type (no-op when none
/// is registered) and records every property change the executor makes, so
/// a user command that triggers recomputation undoes its edit and the
/// side effects atomically.
struct RecordingDispatch<'a> {
    executors: &'a mut FxHashMap<String, Box<dyn ObjectExecutor + Send>>,
    txn: &'a mut TransactionManager,
}

impl ObjectExecutor for RecordingDispatch<'_> {
    fn execute(&mut self, obj: &mut DocumentObject) -> ExecuteOutcome {
        let before: Vec<(String, Property)> = obj
            .properties()
            .map(|(n, p)| (n.to_string(), p.clone()))
            .collect();

        let outcome = match self.executors.get_mut(obj.type_name()) {
            Some(executor) => executor.execute(obj),
            None => NoopExecutor.execute(obj),
        };

        let after: Vec<(String, Property)> = obj
            .properties()
            .map(|(n, p)| (n.to_string(), p.clone()))
            .collect();
        for (name, after_prop) in &after {
            match before.iter().find(|(n, _)| n == name) {
                Some((_, before_prop)) if before_prop == after_prop => {}
                Some((_, before_prop)) => self.txn.record(ChangeRecord::PropertyChanged {
                    object: obj.name().clone(),
                    property: name.clone(),
                    before: Some(before_prop.clone()),
                    after: Some(after_prop.clone()),
                }),
                None => self.txn.record(ChangeRecord::PropertyChanged {
                    object: obj.name().clone(),
                    property: name.clone(),
                    before: None,
                    after: Some(after_prop.clone()),
                }),
            }
        }
        for (name, before_prop) in &before {
            if !after.iter().any(|(n, _)| n == name) {
                self.txn.record(ChangeRecord::PropertyChanged {
                    object: obj.name().clone(),
                    property: name.clone(),
                    before: Some(before_prop.clone()),
                    after: None,
                });
            }
        }
        outcome
    }
}

/// A parametric document: named objects, dependencies, recompute, undo/redo
pub struct Document {
    meta: DocumentMeta,
    store: ObjectStore,
    graph: DependencyGraph,
    tracker: TouchTracker,
    engine: RecomputeEngine,
    txn: TransactionManager,
    executors: FxHashMap<String, Box<dyn ObjectExecutor + Send>>,
    observers: RwLock<Vec<Box<dyn DocumentObserver>>>,
    skip_recompute: bool,
}

impl Document {
    /// Create an empty document with default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Document::with_config(name, DocumentConfig::default())
    }

    /// Create an empty document with explicit bounds
    pub fn with_config(name: impl Into<String>, config: DocumentConfig) -> Self {
        Document {
            meta: DocumentMeta::new(name),
            store: ObjectStore::new(),
            graph: DependencyGraph::new(),
            tracker: TouchTracker::new(),
            engine: RecomputeEngine::new(),
            txn: TransactionManager::new(config.undo_limits()),
            executors: FxHashMap::default(),
            observers: RwLock::new(Vec::new()),
            skip_recompute: false,
        }
    }

    /// Document metadata
    pub fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    /// Change the display label
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.meta.label = label.into();
    }

    // === Observers and executors ===

    /// Register an observer; notified after every state change, in
    /// registration order
    pub fn add_observer(&self, observer: Box<dyn DocumentObserver>) {
        self.observers.write().push(observer);
    }

    /// Register the execute callback for one object type
    pub fn register_executor(
        &mut self,
        type_name: impl Into<String>,
        executor: Box<dyn ObjectExecutor + Send>,
    ) {
        self.executors.insert(type_name.into(), executor);
    }

    fn emit(&self, event: DocumentEvent) {
        for observer in self.observers.read().iter() {
            observer.notify(&event);
        }
    }

    // === Object handling ===

    /// Add a new object and return its unique name
    ///
    /// With no requested name the short type name (after the last `::`)
    /// seeds the generated one. The new object starts touched.
    pub fn add_object(&mut self, type_name: &str, requested: Option<&str>) -> Result<ObjectName> {
        let base = match requested {
            Some(name) => name,
            None => type_name.rsplit("::").next().unwrap_or(type_name),
        };
        let name = self.store.unique_name(base);
        self.store.insert_new(name.clone(), type_name)?;
        self.txn.record(ChangeRecord::object_added(name.clone()));
        self.meta.touch_modified();
        debug!(target: "vellum::doc", object = %name, type_name, "Object added");
        self.emit(DocumentEvent::ObjectAdded {
            object: name.clone(),
        });
        Ok(name)
    }

    /// Remove an object; fails while other objects still link to it
    pub fn remove_object(&mut self, name: &str) -> Result<()> {
        self.remove_object_impl(name, false)
    }

    /// Remove an object, breaking any incoming links first
    ///
    /// The link breakage is routed through the ordinary mutation path, so
    /// it is recorded into the open transaction and undone together with
    /// the removal.
    pub fn remove_object_forced(&mut self, name: &str) -> Result<()> {
        self.remove_object_impl(name, true)
    }

    fn remove_object_impl(&mut self, name: &str, force: bool) -> Result<()> {
        let object = ObjectName::from(name);
        if !self.store.contains(name) {
            return Err(Error::UnknownObject(object));
        }
        self.graph.rebuild(&self.store)?;
        let referencers: Vec<ObjectName> = self.graph.in_list(name).to_vec();
        if !referencers.is_empty() {
            if !force {
                return Err(Error::StillReferenced {
                    object,
                    referencers,
                });
            }
            for referencer in &referencers {
                let mut rewrites: Vec<(String, PropertyData)> = Vec::new();
                if let Some(robj) = self.store.get(referencer.as_str()) {
                    for (pname, prop) in robj.properties() {
                        if prop.references(&object) {
                            let mut fixed = prop.clone();
                            fixed.drop_references_to(&object);
                            rewrites.push((pname.to_string(), fixed.data().clone()));
                        }
                    }
                }
                for (pname, data) in rewrites {
                    self.write_property(referencer.as_str(), &pname, data, false)?;
                }
            }
        }
        let snapshot = self
            .store
            .get(name)
            .ok_or_else(|| Error::UnknownObject(object.clone()))?
            .snapshot();
        self.store.remove(name);
        self.txn.record(ChangeRecord::ObjectRemoved { snapshot });
        self.meta.touch_modified();
        debug!(target: "vellum::doc", object = %object, force, "Object removed");
        self.emit(DocumentEvent::ObjectRemoved { object });
        Ok(())
    }

    /// Look up an object
    pub fn get_object(&self, name: &str) -> Option<&DocumentObject> {
        self.store.get(name)
    }

    /// All objects in creation order
    pub fn objects(&self) -> Vec<&DocumentObject> {
        self.store.iter_creation_order()
    }

    /// All object names in creation order
    pub fn object_names(&self) -> Vec<ObjectName> {
        self.store.names_creation_order()
    }

    /// Objects of one type, in creation order
    pub fn objects_of_type(&self, type_name: &str) -> Vec<&DocumentObject> {
        self.store
            .iter_creation_order()
            .into_iter()
            .filter(|o| o.type_name() == type_name)
            .collect()
    }

    /// Number of objects in the document
    pub fn count_objects(&self) -> usize {
        self.store.len()
    }

    // === Property mutation ===

    /// Add a property to an object
    pub fn add_property(&mut self, object: &str, property: &str, prop: Property) -> Result<()> {
        let oname = ObjectName::from(object);
        reject_self_reference(&oname, prop.data())?;
        let obj = self
            .store
            .get_mut(object)
            .ok_or_else(|| Error::UnknownObject(oname.clone()))?;
        obj.add_property(property, prop.clone())?;
        if prop.is_link() {
            self.store.bump_link_revision();
        }
        self.txn.record(ChangeRecord::PropertyChanged {
            object: oname.clone(),
            property: property.to_string(),
            before: None,
            after: Some(prop),
        });
        self.after_object_mutation(&oname, property)
    }

    /// Remove a property from an object
    pub fn remove_property(&mut self, object: &str, property: &str) -> Result<()> {
        let oname = ObjectName::from(object);
        let obj = self
            .store
            .get_mut(object)
            .ok_or_else(|| Error::UnknownObject(oname.clone()))?;
        let before = obj
            .property(property)
            .cloned()
            .ok_or_else(|| Error::UnknownProperty {
                object: oname.clone(),
                property: property.to_string(),
            })?;
        obj.remove_property(property)?;
        if before.is_link() {
            self.store.bump_link_revision();
        }
        self.txn.record(ChangeRecord::PropertyChanged {
            object: oname.clone(),
            property: property.to_string(),
            before: Some(before),
            after: None,
        });
        self.after_object_mutation(&oname, property)
    }

    /// Change a property's payload
    ///
    /// The single write path for property values: records into the open
    /// transaction, refreshes the dependency graph when links changed and
    /// dirties the owner plus its transitive dependents.
    pub fn set_property(&mut self, object: &str, property: &str, data: PropertyData) -> Result<()> {
        self.write_property(object, property, data, true)
    }

    fn write_property(
        &mut self,
        object: &str,
        property: &str,
        data: PropertyData,
        enforce_read_only: bool,
    ) -> Result<()> {
        let oname = ObjectName::from(object);
        reject_self_reference(&oname, &data)?;
        let obj = self
            .store
            .get_mut(object)
            .ok_or_else(|| Error::UnknownObject(oname.clone()))?;
        let before = obj
            .property(property)
            .cloned()
            .ok_or_else(|| Error::UnknownProperty {
                object: oname.clone(),
                property: property.to_string(),
            })?;
        if enforce_read_only && before.is_read_only() {
            return Err(Error::ReadOnlyProperty {
                object: oname,
                property: property.to_string(),
            });
        }
        let slot = obj
            .property_mut(property)
            .ok_or_else(|| Error::UnknownProperty {
                object: oname.clone(),
                property: property.to_string(),
            })?;
        slot.set_data(data);
        let after = slot.clone();
        if before.is_link() || after.is_link() {
            self.store.bump_link_revision();
        }
        self.txn.record(ChangeRecord::PropertyChanged {
            object: oname.clone(),
            property: property.to_string(),
            before: Some(before),
            after: Some(after),
        });
        self.after_object_mutation(&oname, property)
    }

    /// Shared tail of every property mutation: refresh graph, propagate
    /// dirt, stamp and notify.
    fn after_object_mutation(&mut self, object: &ObjectName, property: &str) -> Result<()> {
        self.graph.rebuild(&self.store)?;
        self.tracker.touch(&mut self.store, &self.graph, object)?;
        self.meta.touch_modified();
        self.emit(DocumentEvent::ObjectChanged {
            object: object.clone(),
            property: property.to_string(),
        });
        Ok(())
    }

    // === Modification state ===

    /// Mark an object and its transitive dependents stale
    pub fn touch_object(&mut self, name: &str) -> Result<()> {
        let object = ObjectName::from(name);
        self.graph.rebuild(&self.store)?;
        let marked = self.tracker.touch(&mut self.store, &self.graph, &object)?;
        for touched in marked {
            self.emit(DocumentEvent::ObjectTouched { object: touched });
        }
        Ok(())
    }

    /// Is any object stale?
    pub fn is_touched(&self) -> bool {
        self.tracker.is_touched(&self.store)
    }

    /// Does any object require execution on the next recompute?
    pub fn must_execute(&self) -> bool {
        self.tracker.must_execute(&self.store)
    }

    /// All stale objects, in creation order
    pub fn touched_objects(&self) -> Vec<ObjectName> {
        self.tracker.touched_objects(&self.store)
    }

    /// Accept the current state: clear every dirty flag without executing
    pub fn purge_touched(&mut self) {
        self.tracker.purge_touched(&mut self.store);
    }

    /// Exclude or include the whole document from recompute
    pub fn set_skip_recompute(&mut self, skip: bool) {
        self.skip_recompute = skip;
    }

    /// Is the whole document excluded from recompute?
    pub fn skips_recompute(&self) -> bool {
        self.skip_recompute
    }

    // === Recompute ===

    /// Recompute stale objects (all, or a subset) in dependency order
    ///
    /// Returns the number of objects actually executed. With a cyclic
    /// graph nothing executes and the recompute log carries the cycle.
    pub fn recompute(&mut self, subset: Option<&[ObjectName]>) -> Result<usize> {
        if self.skip_recompute {
            debug!(target: "vellum::doc", "Recompute skipped by document status");
            return Ok(0);
        }
        let mut dispatch = RecordingDispatch {
            executors: &mut self.executors,
            txn: &mut self.txn,
        };
        let executed = self
            .engine
            .recompute(&mut self.store, &mut self.graph, subset, &mut dispatch)?;
        if executed > 0 {
            self.meta.touch_modified();
        }
        self.emit(DocumentEvent::RecomputeFinished { executed });
        Ok(executed)
    }

    /// Execute one object immediately, optionally recomputing its stale
    /// dependencies first
    pub fn recompute_feature(&mut self, name: &str, recursive: bool) -> Result<()> {
        let object = ObjectName::from(name);
        let mut dispatch = RecordingDispatch {
            executors: &mut self.executors,
            txn: &mut self.txn,
        };
        self.engine.recompute_feature(
            &mut self.store,
            &mut self.graph,
            &object,
            recursive,
            &mut dispatch,
        )
    }

    /// Failure records from the most recent recompute pass
    pub fn recompute_log(&self) -> &[FailureRecord] {
        self.engine.log()
    }

    /// Failure message for one object from the most recent pass
    pub fn error_description(&self, name: &str) -> Option<&str> {
        self.engine.error_description(name)
    }

    /// Token to stop a running recompute between objects
    pub fn cancel_token(&self) -> CancelToken {
        self.engine.cancel_token()
    }

    // === Transactions and undo/redo ===

    /// Open a transaction (or deepen the open one)
    pub fn open_transaction(&mut self, name: Option<&str>) {
        self.txn.open_transaction(name);
    }

    /// Close one nesting level; at the outermost, push onto the undo stack
    pub fn commit_transaction(&mut self) {
        if let Some(summary) = self.txn.commit_transaction() {
            self.emit(DocumentEvent::TransactionCommitted {
                name: summary.name.clone(),
                added: summary.added.clone(),
            });
            if !summary.removed.is_empty() {
                self.emit(DocumentEvent::TransactionRemoved {
                    name: summary.name,
                    removed: summary.removed,
                });
            }
        }
    }

    /// Revert everything recorded so far and discard the open transaction
    pub fn abort_transaction(&mut self) -> Result<()> {
        if let Some(summary) = self.txn.abort_transaction(&mut self.store)? {
            self.after_replay(&summary)?;
            self.emit(DocumentEvent::TransactionAborted { name: summary.name });
        }
        Ok(())
    }

    /// Undo the most recent committed transaction
    ///
    /// Returns false with no state change when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        match self.txn.undo(&mut self.store)? {
            None => Ok(false),
            Some(summary) => {
                self.after_replay(&summary)?;
                self.meta.touch_modified();
                self.emit(DocumentEvent::UndoPerformed {
                    name: summary.name,
                });
                Ok(true)
            }
        }
    }

    /// Reapply the most recently undone transaction
    pub fn redo(&mut self) -> Result<bool> {
        match self.txn.redo(&mut self.store)? {
            None => Ok(false),
            Some(summary) => {
                self.after_replay(&summary)?;
                self.meta.touch_modified();
                self.emit(DocumentEvent::RedoPerformed {
                    name: summary.name,
                });
                Ok(true)
            }
        }
    }

    /// A replay rewired state behind the graph's back: refresh it and
    /// dirty every surviving affected object so recompute picks them up.
    fn after_replay(&mut self, summary: &TransactionSummary) -> Result<()> {
        self.graph.rebuild(&self.store)?;
        for object in &summary.affected {
            if self.store.contains(object.as_str()) {
                self.tracker.touch(&mut self.store, &self.graph, object)?;
            }
        }
        Ok(())
    }

    /// Undo names, most recent first
    pub fn available_undo_names(&self) -> Vec<String> {
        self.txn.undo_names()
    }

    /// Redo names, most recent first
    pub fn available_redo_names(&self) -> Vec<String> {
        self.txn.redo_names()
    }

    /// Number of available undo steps
    pub fn available_undos(&self) -> usize {
        self.txn.undo_count()
    }

    /// Number of available redo steps
    pub fn available_redos(&self) -> usize {
        self.txn.redo_count()
    }

    /// Drop all undo/redo history
    pub fn clear_undos(&mut self) {
        self.txn.clear_undos();
    }

    /// Byte budget for undo history (0 = unbounded)
    pub fn set_undo_limit(&mut self, bytes: usize) {
        self.txn.set_memory_limit(bytes);
    }

    /// Maximum number of undo transactions kept
    pub fn set_max_undo_stack_size(&mut self, size: usize) {
        self.txn.set_max_stack_size(size);
    }

    /// Estimated byte footprint of the undo/redo history
    pub fn undo_mem_size(&self) -> usize {
        self.txn.mem_size()
    }

    /// Is a transaction open?
    pub fn has_pending_transaction(&self) -> bool {
        self.txn.has_pending_transaction()
    }

    /// Is an undo/redo/abort replay running right now?
    pub fn is_performing_transaction(&self) -> bool {
        self.txn.is_replaying()
    }

    // === Dependency queries ===

    /// Dependency-first order over all objects or a subset
    pub fn topological_sort(&mut self, subset: Option<&[ObjectName]>) -> Result<Vec<ObjectName>> {
        self.graph.rebuild(&self.store)?;
        self.graph.topological_sort(&self.store, subset)
    }

    /// Transitive closure of everything the given objects depend on
    pub fn dependency_list(
        &mut self,
        objects: &[ObjectName],
        exclude_external: bool,
        sorted: bool,
    ) -> Result<DependencyList> {
        self.graph.rebuild(&self.store)?;
        self.graph
            .dependency_list(&self.store, objects, exclude_external, sorted)
    }

    /// Does the dependency graph contain a cycle?
    pub fn check_on_cycle(&mut self) -> Result<bool> {
        self.graph.rebuild(&self.store)?;
        Ok(self.graph.has_cycle(&self.store))
    }

    /// Objects nothing depends on, in creation order
    pub fn root_objects(&mut self) -> Result<Vec<ObjectName>> {
        self.graph.rebuild(&self.store)?;
        Ok(self.graph.root_objects(&self.store))
    }

    /// Objects depending directly on the given one
    pub fn in_list(&mut self, name: &str) -> Result<Vec<ObjectName>> {
        self.graph.rebuild(&self.store)?;
        Ok(self.graph.in_list(name).to_vec())
    }

    /// Objects the given one depends on directly
    pub fn out_list(&mut self, name: &str) -> Result<Vec<ObjectName>> {
        self.graph.rebuild(&self.store)?;
        Ok(self.graph.out_list(name).to_vec())
    }

    /// All simple dependency paths from one object to another
    pub fn paths_by_out_list(&mut self, from: &str, to: &str) -> Result<Vec<Vec<ObjectName>>> {
        self.graph.rebuild(&self.store)?;
        Ok(self
            .graph
            .paths_by_out_list(&ObjectName::from(from), &ObjectName::from(to)))
    }

    /// Dump the dependency graph in Graphviz dot format
    pub fn export_graphviz(&mut self, out: &mut dyn std::io::Write) -> Result<()> {
        self.graph.rebuild(&self.store)?;
        self.graph
            .export_graphviz(&self.store, out)
            .map_err(|e| Error::invalid_operation(format!("graphviz export failed: {e}")))
    }

    /// Estimated byte footprint of objects plus undo history
    pub fn mem_size(&self) -> usize {
        self.store.mem_size() + self.txn.mem_size()
    }

    // crate-internal access for the persistence boundary
    pub(crate) fn parts_for_restore(
        &mut self,
    ) -> (
        &mut ObjectStore,
        &mut DependencyGraph,
        &mut TouchTracker,
    ) {
        (&mut self.store, &mut self.graph, &mut self.tracker)
    }

    pub(crate) fn emit_event(&self, event: DocumentEvent) {
        self.emit(event);
    }

    pub(crate) fn store(&self) -> &ObjectStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use vellum_core::Value;

    fn doc_with_chain() -> Document {
        // C depends on B depends on A
        let mut doc = Document::new("test");
        doc.add_object("Part::Sketch", Some("A")).unwrap();
        doc.add_object("Part::Pad", Some("B")).unwrap();
        doc.add_object("Part::Fillet", Some("C")).unwrap();
        doc.add_property("B", "Base", Property::link(Some(ObjectName::from("A"))))
            .unwrap();
        doc.add_property("C", "Base", Property::link(Some(ObjectName::from("B"))))
            .unwrap();
        doc
    }

    #[test]
    fn test_add_object_generates_unique_names() {
        let mut doc = Document::new("test");
        let a = doc.add_object("Part::Box", None).unwrap();
        let b = doc.add_object("Part::Box", None).unwrap();
        assert_eq!(a.as_str(), "Box");
        assert_eq!(b.as_str(), "Box001");
        assert_eq!(doc.count_objects(), 2);
    }

    #[test]
    fn test_duplicate_explicit_name_resolved() {
        let mut doc = Document::new("test");
        doc.add_object("T", Some("X")).unwrap();
        let second = doc.add_object("T", Some("X")).unwrap();
        assert_eq!(second.as_str(), "X001");
    }

    #[test]
    fn test_remove_referenced_object_rejected() {
        let mut doc = doc_with_chain();
        let err = doc.remove_object("A").unwrap_err();
        match err {
            Error::StillReferenced { referencers, .. } => {
                assert_eq!(referencers, vec![ObjectName::from("B")]);
            }
            other => panic!("expected StillReferenced, got {other:?}"),
        }
        assert!(doc.get_object("A").is_some());
    }

    #[test]
    fn test_forced_remove_breaks_incoming_links() {
        let mut doc = doc_with_chain();
        doc.remove_object_forced("A").unwrap();
        assert!(doc.get_object("A").is_none());
        let b_base = doc.get_object("B").unwrap().property("Base").unwrap();
        assert_eq!(b_base.data(), &PropertyData::Link(None));
    }

    #[test]
    fn test_self_link_rejected_at_mutation() {
        let mut doc = Document::new("test");
        doc.add_object("T", Some("X")).unwrap();
        let err = doc
            .add_property("X", "Me", Property::link(Some(ObjectName::from("X"))))
            .unwrap_err();
        assert!(matches!(err, Error::SelfReference(_)));
    }

    #[test]
    fn test_set_property_touches_dependents() {
        let mut doc = doc_with_chain();
        doc.recompute(None).unwrap();
        assert!(!doc.is_touched());
        doc.set_property("A", "Base", PropertyData::Scalar(Value::Int(1)))
            .unwrap_err(); // A has no property Base
        doc.add_property("A", "Width", Property::scalar(Value::Int(1)))
            .unwrap();
        assert!(doc.get_object("B").unwrap().is_touched());
        assert!(doc.get_object("C").unwrap().is_touched());
    }

    #[test]
    fn test_read_only_property_rejects_write() {
        let mut doc = Document::new("test");
        doc.add_object("T", Some("X")).unwrap();
        doc.add_property("X", "Fixed", Property::scalar(Value::Int(1)).with_read_only())
            .unwrap();
        let err = doc
            .set_property("X", "Fixed", PropertyData::Scalar(Value::Int(2)))
            .unwrap_err();
        assert!(matches!(err, Error::ReadOnlyProperty { .. }));
    }

    #[test]
    fn test_recompute_counts_and_idempotence() {
        let mut doc = doc_with_chain();
        assert_eq!(doc.recompute(None).unwrap(), 3);
        assert_eq!(doc.recompute(None).unwrap(), 0);
    }

    #[test]
    fn test_document_skip_recompute() {
        let mut doc = doc_with_chain();
        doc.set_skip_recompute(true);
        assert_eq!(doc.recompute(None).unwrap(), 0);
        assert!(doc.is_touched());
        doc.set_skip_recompute(false);
        assert_eq!(doc.recompute(None).unwrap(), 3);
    }

    #[test]
    fn test_events_emitted_in_order() {
        struct Collector(Arc<Mutex<Vec<String>>>);
        impl DocumentObserver for Collector {
            fn notify(&self, event: &DocumentEvent) {
                let tag = match event {
                    DocumentEvent::ObjectAdded { .. } => "added",
                    DocumentEvent::ObjectRemoved { .. } => "removed",
                    DocumentEvent::ObjectChanged { .. } => "changed",
                    DocumentEvent::RecomputeFinished { .. } => "recomputed",
                    _ => "other",
                };
                self.0.lock().unwrap().push(tag.to_string());
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut doc = Document::new("test");
        doc.add_observer(Box::new(Collector(log.clone())));
        doc.add_object("T", Some("X")).unwrap();
        doc.add_property("X", "V", Property::scalar(Value::Int(1)))
            .unwrap();
        doc.recompute(None).unwrap();
        doc.remove_object("X").unwrap();
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &["added", "changed", "recomputed", "removed"]
        );
    }

    #[test]
    fn test_transaction_abort_restores_state() {
        let mut doc = Document::new("test");
        doc.add_object("T", Some("X")).unwrap();
        doc.add_property("X", "V", Property::scalar(Value::Int(1)))
            .unwrap();
        doc.recompute(None).unwrap();

        doc.open_transaction(Some("edit"));
        doc.set_property("X", "V", PropertyData::Scalar(Value::Int(99)))
            .unwrap();
        doc.add_object("T", Some("Y")).unwrap();
        doc.abort_transaction().unwrap();

        assert!(doc.get_object("Y").is_none());
        assert_eq!(
            doc.get_object("X").unwrap().property("V").unwrap().data(),
            &PropertyData::Scalar(Value::Int(1))
        );
        assert_eq!(doc.available_undos(), 0);
    }

    #[test]
    fn test_undo_recreates_removed_object_with_properties() {
        let mut doc = Document::new("test");
        doc.add_object("T", Some("X")).unwrap();
        doc.add_property("X", "V", Property::scalar(Value::Int(7)))
            .unwrap();

        doc.open_transaction(Some("remove X"));
        doc.remove_object("X").unwrap();
        doc.commit_transaction();
        assert!(doc.get_object("X").is_none());

        assert!(doc.undo().unwrap());
        let x = doc.get_object("X").unwrap();
        assert_eq!(
            x.property("V").unwrap().data(),
            &PropertyData::Scalar(Value::Int(7))
        );
    }

    #[test]
    fn test_redo_invalidated_by_new_mutation() {
        let mut doc = Document::new("test");
        doc.add_object("T", Some("X")).unwrap();
        doc.add_property("X", "V", Property::scalar(Value::Int(0)))
            .unwrap();

        doc.open_transaction(Some("one"));
        doc.set_property("X", "V", PropertyData::Scalar(Value::Int(1)))
            .unwrap();
        doc.commit_transaction();
        assert!(doc.undo().unwrap());
        assert_eq!(doc.available_redo_names(), vec!["one".to_string()]);

        // New mutation outside redo clears the forked future
        doc.set_property("X", "V", PropertyData::Scalar(Value::Int(5)))
            .unwrap();
        assert!(doc.available_redo_names().is_empty());
        assert!(!doc.redo().unwrap());
    }

    #[test]
    fn test_recompute_changes_recorded_into_open_transaction() {
        struct Doubler;
        impl ObjectExecutor for Doubler {
            fn execute(&mut self, obj: &mut DocumentObject) -> ExecuteOutcome {
                let doubled = match obj.property("V").map(|p| p.data()) {
                    Some(PropertyData::Scalar(Value::Int(v))) => v * 2,
                    _ => return ExecuteOutcome::Recoverable("missing V".into()),
                };
                if let Some(slot) = obj.property_mut("V") {
                    slot.set_data(PropertyData::Scalar(Value::Int(doubled)));
                }
                ExecuteOutcome::Success
            }
        }

        let mut doc = Document::new("test");
        doc.register_executor("Calc", Box::new(Doubler));
        doc.add_object("Calc", Some("X")).unwrap();
        doc.add_property("X", "V", Property::scalar(Value::Int(3)))
            .unwrap();
        doc.recompute(None).unwrap();
        assert_eq!(
            doc.get_object("X").unwrap().property("V").unwrap().data(),
            &PropertyData::Scalar(Value::Int(6))
        );

        // A user edit plus the recompute side effect undo atomically
        doc.open_transaction(Some("edit"));
        doc.set_property("X", "V", PropertyData::Scalar(Value::Int(10)))
            .unwrap();
        doc.recompute(None).unwrap();
        doc.commit_transaction();
        assert_eq!(
            doc.get_object("X").unwrap().property("V").unwrap().data(),
            &PropertyData::Scalar(Value::Int(20))
        );

        assert!(doc.undo().unwrap());
        assert_eq!(
            doc.get_object("X").unwrap().property("V").unwrap().data(),
            &PropertyData::Scalar(Value::Int(6))
        );
    }

    #[test]
    fn test_graph_queries_through_facade() {
        let mut doc = doc_with_chain();
        let order = doc.topological_sort(None).unwrap();
        assert_eq!(
            order,
            vec![ObjectName::from("A"), ObjectName::from("B"), ObjectName::from("C")]
        );
        assert!(!doc.check_on_cycle().unwrap());
        assert_eq!(doc.root_objects().unwrap(), vec![ObjectName::from("C")]);
        assert_eq!(doc.in_list("A").unwrap(), vec![ObjectName::from("B")]);
        assert_eq!(doc.out_list("C").unwrap(), vec![ObjectName::from("B")]);
        let paths = doc.paths_by_out_list("C", "A").unwrap();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_cycle_detected_through_facade() {
        let mut doc = Document::new("test");
        doc.add_object("T", Some("A")).unwrap();
        doc.add_object("T", Some("B")).unwrap();
        doc.add_property("A", "L", Property::link(Some(ObjectName::from("B"))))
            .unwrap();
        doc.add_property("B", "L", Property::link(Some(ObjectName::from("A"))))
            .unwrap();
        assert!(doc.check_on_cycle().unwrap());
        assert_eq!(doc.recompute(None).unwrap(), 0);
        assert!(!doc.recompute_log().is_empty());
    }

    #[test]
    fn test_mem_size_includes_undo_history() {
        let mut doc = Document::new("test");
        doc.add_object("T", Some("X")).unwrap();
        doc.add_property("X", "Data", Property::scalar(Value::String("d".repeat(400))))
            .unwrap();
        doc.open_transaction(Some("big edit"));
        doc.set_property(
            "X",
            "Data",
            PropertyData::Scalar(Value::String("e".repeat(400))),
        )
        .unwrap();
        doc.commit_transaction();
        assert!(doc.undo_mem_size() >= 400);
        assert!(doc.mem_size() > doc.undo_mem_size());
    }
}
