//! Properties: named, typed value cells owned by document objects
//!
//! The kernel understands a property's *structure* (is it a link, which
//! objects does it reference) but never its scalar payload. The closed set of
//! variants keeps dependency-edge extraction purely structural.

use crate::types::ObjectName;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// The structural payload of a property
///
/// Link variants hold weak, name-based references to other objects in the
/// same document. A referenced object may have been removed; callers must
/// revalidate names against the document before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyData {
    /// Opaque scalar value the kernel never interprets
    Scalar(Value),
    /// Reference to at most one other object
    Link(Option<ObjectName>),
    /// Ordered references to zero or more other objects
    LinkList(Vec<ObjectName>),
    /// Reference to one object plus named sub-elements within it
    LinkSub {
        /// Referenced object, if any
        target: Option<ObjectName>,
        /// Named sub-elements of the target (opaque to the kernel)
        elements: Vec<String>,
    },
}

impl PropertyData {
    /// True for the link-shaped variants
    pub fn is_link(&self) -> bool {
        !matches!(self, PropertyData::Scalar(_))
    }

    /// All objects this data references, in declaration order
    pub fn referenced_objects(&self) -> Vec<&ObjectName> {
        match self {
            PropertyData::Scalar(_) => Vec::new(),
            PropertyData::Link(target) => target.iter().collect(),
            PropertyData::LinkList(targets) => targets.iter().collect(),
            PropertyData::LinkSub { target, .. } => target.iter().collect(),
        }
    }

    /// True if this data references the given object
    pub fn references(&self, name: &ObjectName) -> bool {
        self.referenced_objects().into_iter().any(|n| n == name)
    }

    /// Estimated deep memory footprint in bytes
    pub fn mem_size(&self) -> usize {
        let inline = std::mem::size_of::<PropertyData>();
        match self {
            PropertyData::Scalar(v) => inline + v.mem_size(),
            PropertyData::Link(t) => {
                inline + t.as_ref().map_or(0, |n| n.as_str().len())
            }
            PropertyData::LinkList(ts) => {
                inline + ts.iter().map(|n| n.as_str().len()).sum::<usize>()
            }
            PropertyData::LinkSub { target, elements } => {
                inline
                    + target.as_ref().map_or(0, |n| n.as_str().len())
                    + elements.iter().map(String::len).sum::<usize>()
            }
        }
    }
}

/// A named, typed value cell owned by exactly one document object
///
/// The touched flag marks the cell stale; link-shaped properties contribute
/// edges to the dependency graph. `skip_propagation` marks a link as purely
/// presentational: a change of the target does not dirty the owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    data: PropertyData,
    touched: bool,
    skip_propagation: bool,
    read_only: bool,
}

impl Property {
    /// Create a property from structural data, initially touched
    pub fn new(data: PropertyData) -> Self {
        Property {
            data,
            touched: true,
            skip_propagation: false,
            read_only: false,
        }
    }

    /// Create a scalar property
    pub fn scalar(value: impl Into<Value>) -> Self {
        Property::new(PropertyData::Scalar(value.into()))
    }

    /// Create a single-target link property
    pub fn link(target: Option<ObjectName>) -> Self {
        Property::new(PropertyData::Link(target))
    }

    /// Create a multi-target link property
    pub fn link_list(targets: Vec<ObjectName>) -> Self {
        Property::new(PropertyData::LinkList(targets))
    }

    /// Mark this link as presentational: changes of its target do not dirty
    /// the owning object
    pub fn with_skip_propagation(mut self) -> Self {
        self.skip_propagation = true;
        self
    }

    /// Reject all future mutation through the document API
    pub fn with_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// The structural payload
    pub fn data(&self) -> &PropertyData {
        &self.data
    }

    /// Replace the payload; marks the property touched
    pub fn set_data(&mut self, data: PropertyData) {
        self.data = data;
        self.touched = true;
    }

    /// True for link-shaped properties
    pub fn is_link(&self) -> bool {
        self.data.is_link()
    }

    /// All objects this property references
    pub fn referenced_objects(&self) -> Vec<&ObjectName> {
        self.data.referenced_objects()
    }

    /// True if this property references the given object
    pub fn references(&self, name: &ObjectName) -> bool {
        self.data.references(name)
    }

    /// Is the cell known stale?
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Mark the cell stale
    pub fn touch(&mut self) {
        self.touched = true;
    }

    /// Clear the stale flag
    pub fn clear_touched(&mut self) {
        self.touched = false;
    }

    /// Does this link opt out of touch propagation?
    pub fn skips_propagation(&self) -> bool {
        self.skip_propagation
    }

    /// Is mutation rejected for this property?
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Remove every reference to `name`, returning true if anything changed
    ///
    /// Used when an object is force-removed and its incoming links must be
    /// broken. Does not mark the property touched; the caller routes the
    /// rewrite through the document mutation API which handles that.
    pub fn drop_references_to(&mut self, name: &ObjectName) -> bool {
        match &mut self.data {
            PropertyData::Scalar(_) => false,
            PropertyData::Link(target) => {
                if target.as_ref() == Some(name) {
                    *target = None;
                    true
                } else {
                    false
                }
            }
            PropertyData::LinkList(targets) => {
                let before = targets.len();
                targets.retain(|t| t != name);
                targets.len() != before
            }
            PropertyData::LinkSub { target, elements } => {
                if target.as_ref() == Some(name) {
                    *target = None;
                    elements.clear();
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Estimated deep memory footprint in bytes
    pub fn mem_size(&self) -> usize {
        self.data.mem_size() + 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ObjectName {
        ObjectName::from(s)
    }

    #[test]
    fn test_scalar_has_no_references() {
        let prop = Property::scalar(42i64);
        assert!(!prop.is_link());
        assert!(prop.referenced_objects().is_empty());
    }

    #[test]
    fn test_link_references() {
        let prop = Property::link(Some(name("Base")));
        assert!(prop.is_link());
        assert_eq!(prop.referenced_objects(), vec![&name("Base")]);
        assert!(prop.references(&name("Base")));
        assert!(!prop.references(&name("Other")));
    }

    #[test]
    fn test_empty_link_is_still_a_link() {
        let prop = Property::link(None);
        assert!(prop.is_link());
        assert!(prop.referenced_objects().is_empty());
    }

    #[test]
    fn test_link_list_order_preserved() {
        let prop = Property::link_list(vec![name("A"), name("B"), name("A")]);
        let refs: Vec<&str> = prop
            .referenced_objects()
            .into_iter()
            .map(ObjectName::as_str)
            .collect();
        assert_eq!(refs, vec!["A", "B", "A"]);
    }

    #[test]
    fn test_new_property_is_touched() {
        let mut prop = Property::scalar(1i64);
        assert!(prop.is_touched());
        prop.clear_touched();
        assert!(!prop.is_touched());
        prop.set_data(PropertyData::Scalar(Value::Int(2)));
        assert!(prop.is_touched());
    }

    #[test]
    fn test_drop_references_single_link() {
        let mut prop = Property::link(Some(name("Gone")));
        assert!(prop.drop_references_to(&name("Gone")));
        assert_eq!(prop.data(), &PropertyData::Link(None));
        assert!(!prop.drop_references_to(&name("Gone")));
    }

    #[test]
    fn test_drop_references_link_list() {
        let mut prop = Property::link_list(vec![name("A"), name("B"), name("A")]);
        assert!(prop.drop_references_to(&name("A")));
        assert_eq!(prop.data(), &PropertyData::LinkList(vec![name("B")]));
    }

    #[test]
    fn test_drop_references_link_sub_clears_elements() {
        let mut prop = Property::new(PropertyData::LinkSub {
            target: Some(name("Shape")),
            elements: vec!["Face1".to_string(), "Edge3".to_string()],
        });
        assert!(prop.drop_references_to(&name("Shape")));
        assert_eq!(
            prop.data(),
            &PropertyData::LinkSub {
                target: None,
                elements: vec![],
            }
        );
    }

    #[test]
    fn test_skip_propagation_marker() {
        let prop = Property::link(Some(name("Anno"))).with_skip_propagation();
        assert!(prop.skips_propagation());
    }

    #[test]
    fn test_serde_roundtrip() {
        let prop = Property::link_list(vec![name("X")]).with_skip_propagation();
        let json = serde_json::to_string(&prop).unwrap();
        let back: Property = serde_json::from_str(&json).unwrap();
        assert_eq!(prop, back);
    }
}
