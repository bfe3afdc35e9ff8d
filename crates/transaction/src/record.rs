//! Change records: the atoms of an undoable transaction
//!
//! Every mutation that goes through the document API is captured as one
//! record. Records know how to revert and reapply themselves against the
//! object store; a transaction replays them in reverse for undo/abort and
//! forward for redo.
//!
//! Property changes carry optional before/after images: `None` stands for
//! "the property did not exist", which makes dynamic property addition and
//! removal replayable with the same record shape.

use serde::{Deserialize, Serialize};
use vellum_core::{
    DocumentObject, Error, ObjectName, ObjectSnapshot, ObjectStore, Property, Result,
};

/// One recorded mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChangeRecord {
    /// An object was created
    ObjectAdded {
        /// Name of the created object
        name: ObjectName,
        /// Full state captured when the addition is undone, so redo can
        /// recreate the object; None until the first revert
        snapshot: Option<ObjectSnapshot>,
    },
    /// An object was removed; the snapshot recreates it on undo
    ObjectRemoved {
        /// Full state at the moment of removal
        snapshot: ObjectSnapshot,
    },
    /// A property was added, changed or removed
    PropertyChanged {
        /// Owning object
        object: ObjectName,
        /// Property name
        property: String,
        /// State before the change; None if the property did not exist
        before: Option<Property>,
        /// State after the change; None if the property was removed
        after: Option<Property>,
    },
}

impl ChangeRecord {
    /// Record for a freshly created object
    pub fn object_added(name: ObjectName) -> Self {
        ChangeRecord::ObjectAdded {
            name,
            snapshot: None,
        }
    }

    /// The object this record is about
    pub fn object_name(&self) -> &ObjectName {
        match self {
            ChangeRecord::ObjectAdded { name, .. } => name,
            ChangeRecord::ObjectRemoved { snapshot } => &snapshot.name,
            ChangeRecord::PropertyChanged { object, .. } => object,
        }
    }

    /// Undo this record against the store
    ///
    /// A record that cannot be reverted means the store diverged from the
    /// history that produced it; that is a hard error, never silently
    /// ignored. Undoing an object addition captures the object's state so
    /// a later redo can recreate it.
    pub fn revert(&mut self, store: &mut ObjectStore) -> Result<()> {
        match self {
            ChangeRecord::ObjectAdded { name, snapshot } => {
                let removed = store.remove(name.as_str()).ok_or_else(|| {
                    Error::invalid_operation(format!(
                        "undo cannot remove '{name}': object no longer exists"
                    ))
                })?;
                *snapshot = Some(removed.snapshot());
                Ok(())
            }
            ChangeRecord::ObjectRemoved { snapshot } => {
                store.restore(DocumentObject::from_snapshot(snapshot.clone()))
            }
            ChangeRecord::PropertyChanged {
                object,
                property,
                before,
                ..
            } => apply_property_state(store, object, property, before.as_ref()),
        }
    }

    /// Redo this record against the store
    pub fn reapply(&mut self, store: &mut ObjectStore) -> Result<()> {
        match self {
            ChangeRecord::ObjectAdded { name, snapshot } => {
                let snap = snapshot.clone().ok_or_else(|| {
                    Error::invalid_operation(format!(
                        "redo cannot recreate '{name}': no captured state"
                    ))
                })?;
                store.restore(DocumentObject::from_snapshot(snap))
            }
            ChangeRecord::ObjectRemoved { snapshot } => {
                store.remove(snapshot.name.as_str()).ok_or_else(|| {
                    Error::invalid_operation(format!(
                        "redo cannot remove '{}': object no longer exists",
                        snapshot.name
                    ))
                })?;
                Ok(())
            }
            ChangeRecord::PropertyChanged {
                object,
                property,
                after,
                ..
            } => apply_property_state(store, object, property, after.as_ref()),
        }
    }

    /// Estimated byte footprint of the captured state
    pub fn mem_size(&self) -> usize {
        let inline = std::mem::size_of::<ChangeRecord>();
        match self {
            ChangeRecord::ObjectAdded { name, snapshot } => {
                inline
                    + name.as_str().len()
                    + snapshot.as_ref().map_or(0, ObjectSnapshot::mem_size)
            }
            ChangeRecord::ObjectRemoved { snapshot } => inline + snapshot.mem_size(),
            ChangeRecord::PropertyChanged {
                object,
                property,
                before,
                after,
            } => {
                inline
                    + object.as_str().len()
                    + property.len()
                    + before.as_ref().map_or(0, Property::mem_size)
                    + after.as_ref().map_or(0, Property::mem_size)
            }
        }
    }
}

/// Force one property of one object into the given state
fn apply_property_state(
    store: &mut ObjectStore,
    object: &ObjectName,
    property: &str,
    state: Option<&Property>,
) -> Result<()> {
    let obj = store
        .get_mut(object.as_str())
        .ok_or_else(|| Error::UnknownObject(object.clone()))?;
    match state {
        Some(prop) => {
            if let Some(slot) = obj.property_mut(property) {
                *slot = prop.clone();
            } else {
                obj.add_property(property, prop.clone())?;
            }
        }
        None => {
            obj.remove_property(property)?;
        }
    }
    // Link topology may have changed either way.
    store.bump_link_revision();
    Ok(())
}
