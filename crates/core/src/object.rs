//! Document objects: named nodes owning an ordered set of properties
//!
//! An object is owned exclusively by its document. Its execution status is
//! tracked with a handful of flags plus an optional error payload from the
//! last failed execute.

use crate::error::{Error, Result};
use crate::property::{Property, PropertyData};
use crate::types::ObjectName;
use serde::{Deserialize, Serialize};

/// A named node of the document graph
///
/// Properties are kept in insertion order so iteration and serialization are
/// deterministic. `creation_index` is the stable secondary sort key used to
/// break ties among independent objects in topological order.
#[derive(Debug, Clone)]
pub struct DocumentObject {
    name: ObjectName,
    type_name: String,
    label: String,
    creation_index: u64,
    // Insertion-ordered; objects carry few properties, linear lookup is fine.
    props: Vec<(String, Property)>,
    touched: bool,
    skip_recompute: bool,
    restoring: bool,
    error: Option<String>,
}

impl DocumentObject {
    /// Create a new object; the document assigns name and creation index
    pub fn new(name: ObjectName, type_name: impl Into<String>, creation_index: u64) -> Self {
        let label = name.as_str().to_string();
        DocumentObject {
            name,
            type_name: type_name.into(),
            label,
            creation_index,
            props: Vec::new(),
            touched: true,
            skip_recompute: false,
            restoring: false,
            error: None,
        }
    }

    /// Unique, stable name within the owning document
    pub fn name(&self) -> &ObjectName {
        &self.name
    }

    /// Type identifier supplied at creation
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Mutable display label (not the identity)
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Change the display label
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Stable creation-order key
    pub fn creation_index(&self) -> u64 {
        self.creation_index
    }

    // === Properties ===

    /// Add a property; fails if the name is already taken
    pub fn add_property(&mut self, name: impl Into<String>, prop: Property) -> Result<()> {
        let name = name.into();
        if self.props.iter().any(|(n, _)| *n == name) {
            return Err(Error::DuplicateProperty {
                object: self.name.clone(),
                property: name,
            });
        }
        self.props.push((name, prop));
        self.touched = true;
        Ok(())
    }

    /// Remove a property, returning it
    pub fn remove_property(&mut self, name: &str) -> Result<Property> {
        let pos = self
            .props
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| Error::UnknownProperty {
                object: self.name.clone(),
                property: name.to_string(),
            })?;
        self.touched = true;
        Ok(self.props.remove(pos).1)
    }

    /// Look up a property by name
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.props.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    /// Look up a property mutably
    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.props
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    /// All properties in insertion order
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.props.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// All properties mutably, in insertion order
    pub fn properties_mut(&mut self) -> impl Iterator<Item = (&str, &mut Property)> {
        self.props.iter_mut().map(|(n, p)| (n.as_str(), &mut *p))
    }

    /// Names of all objects this object links to, deduplicated, in
    /// property-declaration order
    pub fn out_links(&self) -> Vec<&ObjectName> {
        let mut seen: Vec<&ObjectName> = Vec::new();
        for (_, prop) in &self.props {
            for target in prop.referenced_objects() {
                if !seen.contains(&target) {
                    seen.push(target);
                }
            }
        }
        seen
    }

    /// True if any link property of this object references `target` through
    /// a propagating (non-presentational) link
    pub fn has_propagating_link_to(&self, target: &ObjectName) -> bool {
        self.props
            .iter()
            .any(|(_, p)| !p.skips_propagation() && p.references(target))
    }

    // === Status ===

    /// Known stale: either the object itself or any of its properties
    pub fn is_touched(&self) -> bool {
        self.touched || self.props.iter().any(|(_, p)| p.is_touched())
    }

    /// Mark the object stale
    pub fn touch(&mut self) {
        self.touched = true;
    }

    /// Clear all stale flags on the object and its properties
    pub fn purge_touched(&mut self) {
        self.touched = false;
        for (_, prop) in &mut self.props {
            prop.clear_touched();
        }
    }

    /// Does this object require execution on the next recompute?
    pub fn must_execute(&self) -> bool {
        !self.skip_recompute && self.is_touched()
    }

    /// Is this object excluded from recompute?
    pub fn skips_recompute(&self) -> bool {
        self.skip_recompute
    }

    /// Exclude or include this object in recompute passes
    pub fn set_skip_recompute(&mut self, skip: bool) {
        self.skip_recompute = skip;
    }

    /// Is this object being reconstructed from persisted state?
    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    /// Enter or leave the restoring state
    pub fn set_restoring(&mut self, restoring: bool) {
        self.restoring = restoring;
    }

    /// Error message from the last failed execute, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True if the last execute failed
    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    /// Record an execution failure
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Clear the error state
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Estimated deep memory footprint in bytes
    pub fn mem_size(&self) -> usize {
        std::mem::size_of::<DocumentObject>()
            + self.name.as_str().len()
            + self.type_name.len()
            + self.label.len()
            + self
                .props
                .iter()
                .map(|(n, p)| n.len() + p.mem_size())
                .sum::<usize>()
    }

    // === Snapshots ===

    /// Capture the full state for an object-removed change record
    pub fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            name: self.name.clone(),
            type_name: self.type_name.clone(),
            label: self.label.clone(),
            creation_index: self.creation_index,
            props: self.props.clone(),
            skip_recompute: self.skip_recompute,
        }
    }

    /// Rebuild an object from a snapshot
    ///
    /// The restored object is marked touched so the next recompute re-runs
    /// it against the current graph.
    pub fn from_snapshot(snapshot: ObjectSnapshot) -> Self {
        DocumentObject {
            name: snapshot.name,
            type_name: snapshot.type_name,
            label: snapshot.label,
            creation_index: snapshot.creation_index,
            props: snapshot.props,
            touched: true,
            skip_recompute: snapshot.skip_recompute,
            restoring: false,
            error: None,
        }
    }
}

/// Full serializable state of one object
///
/// Carried by object-removed change records (so undo can recreate the
/// object) and handed across the persistence boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    /// Unique object name
    pub name: ObjectName,
    /// Type identifier
    pub type_name: String,
    /// Display label
    pub label: String,
    /// Stable creation-order key
    pub creation_index: u64,
    /// Properties in insertion order
    pub props: Vec<(String, Property)>,
    /// Excluded from recompute?
    pub skip_recompute: bool,
}

impl ObjectSnapshot {
    /// Estimated deep memory footprint in bytes
    pub fn mem_size(&self) -> usize {
        std::mem::size_of::<ObjectSnapshot>()
            + self.name.as_str().len()
            + self.type_name.len()
            + self.label.len()
            + self
                .props
                .iter()
                .map(|(n, p)| n.len() + p.mem_size())
                .sum::<usize>()
    }

    /// Names of all objects the snapshotted properties link to
    pub fn out_links(&self) -> Vec<&ObjectName> {
        let mut seen: Vec<&ObjectName> = Vec::new();
        for (_, prop) in &self.props {
            for target in prop.referenced_objects() {
                if !seen.contains(&target) {
                    seen.push(target);
                }
            }
        }
        seen
    }
}

/// Check a property payload for a self-reference before it is attached
pub fn reject_self_reference(owner: &ObjectName, data: &PropertyData) -> Result<()> {
    if data.references(owner) {
        return Err(Error::SelfReference(owner.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn obj(name: &str) -> DocumentObject {
        DocumentObject::new(ObjectName::from(name), "Test::Feature", 0)
    }

    #[test]
    fn test_new_object_is_touched() {
        let o = obj("Box");
        assert!(o.is_touched());
        assert!(o.must_execute());
    }

    #[test]
    fn test_purge_touched_clears_object_and_properties() {
        let mut o = obj("Box");
        o.add_property("Length", Property::scalar(10i64)).unwrap();
        assert!(o.is_touched());
        o.purge_touched();
        assert!(!o.is_touched());
        assert!(!o.must_execute());
    }

    #[test]
    fn test_property_touch_makes_object_touched() {
        let mut o = obj("Box");
        o.add_property("Length", Property::scalar(10i64)).unwrap();
        o.purge_touched();
        o.property_mut("Length").unwrap().touch();
        assert!(o.is_touched());
    }

    #[test]
    fn test_skip_recompute_suppresses_must_execute() {
        let mut o = obj("Box");
        o.set_skip_recompute(true);
        assert!(o.is_touched());
        assert!(!o.must_execute());
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let mut o = obj("Box");
        o.add_property("Length", Property::scalar(1i64)).unwrap();
        let err = o.add_property("Length", Property::scalar(2i64)).unwrap_err();
        assert!(matches!(err, Error::DuplicateProperty { .. }));
    }

    #[test]
    fn test_property_insertion_order_preserved() {
        let mut o = obj("Box");
        o.add_property("B", Property::scalar(1i64)).unwrap();
        o.add_property("A", Property::scalar(2i64)).unwrap();
        o.add_property("C", Property::scalar(3i64)).unwrap();
        let names: Vec<&str> = o.properties().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_out_links_deduplicated() {
        let mut o = obj("Pad");
        o.add_property("Base", Property::link(Some(ObjectName::from("Sketch"))))
            .unwrap();
        o.add_property(
            "Extras",
            Property::link_list(vec![ObjectName::from("Sketch"), ObjectName::from("Plane")]),
        )
        .unwrap();
        let links: Vec<&str> = o.out_links().into_iter().map(ObjectName::as_str).collect();
        assert_eq!(links, vec!["Sketch", "Plane"]);
    }

    #[test]
    fn test_propagating_link_honors_skip_marker() {
        let mut o = obj("Note");
        o.add_property(
            "Anchor",
            Property::link(Some(ObjectName::from("Box"))).with_skip_propagation(),
        )
        .unwrap();
        assert!(!o.has_propagating_link_to(&ObjectName::from("Box")));
        o.add_property("Target", Property::link(Some(ObjectName::from("Box"))))
            .unwrap();
        assert!(o.has_propagating_link_to(&ObjectName::from("Box")));
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_properties() {
        let mut o = obj("Box");
        o.add_property("Length", Property::scalar(Value::Float(10.5)))
            .unwrap();
        o.set_label("My Box");
        let snap = o.snapshot();
        let restored = DocumentObject::from_snapshot(snap);
        assert_eq!(restored.name().as_str(), "Box");
        assert_eq!(restored.label(), "My Box");
        assert_eq!(
            restored.property("Length").unwrap().data(),
            o.property("Length").unwrap().data()
        );
        assert!(restored.is_touched());
    }

    #[test]
    fn test_error_state() {
        let mut o = obj("Box");
        assert!(!o.is_errored());
        o.set_error("kaput");
        assert_eq!(o.error(), Some("kaput"));
        o.clear_error();
        assert!(!o.is_errored());
    }

    #[test]
    fn test_reject_self_reference() {
        let owner = ObjectName::from("Loop");
        let data = PropertyData::Link(Some(ObjectName::from("Loop")));
        assert!(matches!(
            reject_self_reference(&owner, &data),
            Err(Error::SelfReference(_))
        ));
        let ok = PropertyData::Link(Some(ObjectName::from("Other")));
        assert!(reject_self_reference(&owner, &ok).is_ok());
    }
}
