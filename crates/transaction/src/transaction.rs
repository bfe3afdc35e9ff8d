//! One undoable unit of work
//!
//! A transaction is an ordered list of change records tagged with a
//! human-readable name. Reverting replays the records last-to-first;
//! reapplying runs them first-to-last.

use crate::record::ChangeRecord;
use vellum_core::{ObjectName, ObjectStore, Result};

/// An atomic, undoable unit of recorded change
#[derive(Debug, Clone)]
pub struct Transaction {
    id: u64,
    name: String,
    records: Vec<ChangeRecord>,
}

impl Transaction {
    /// Create an empty transaction
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Transaction {
            id,
            name: name.into(),
            records: Vec::new(),
        }
    }

    /// Monotonic transaction id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Human-readable name shown in undo/redo menus
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of change records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a change record
    ///
    /// Successive changes to the same property collapse into the record
    /// that first captured it: the original before-image is kept and the
    /// after-image is updated, so revert restores the pre-transaction
    /// value. The collapse stops at any object lifecycle record for the
    /// same object, which keeps remove/re-add sequences replayable.
    pub fn record(&mut self, change: ChangeRecord) {
        if let ChangeRecord::PropertyChanged {
            object,
            property,
            after,
            ..
        } = &change
        {
            for existing in self.records.iter_mut().rev() {
                match existing {
                    ChangeRecord::PropertyChanged {
                        object: eo,
                        property: ep,
                        after: ea,
                        ..
                    } if eo == object && ep == property => {
                        *ea = after.clone();
                        return;
                    }
                    ChangeRecord::ObjectAdded { name, .. }
                    | ChangeRecord::ObjectRemoved {
                        snapshot: vellum_core::ObjectSnapshot { name, .. },
                    } if name == object => break,
                    _ => {}
                }
            }
        }
        self.records.push(change);
    }

    /// The recorded changes in recording order
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Undo every recorded change, last recorded first
    pub fn revert(&mut self, store: &mut ObjectStore) -> Result<()> {
        for record in self.records.iter_mut().rev() {
            record.revert(store)?;
        }
        Ok(())
    }

    /// Redo every recorded change in recording order
    pub fn reapply(&mut self, store: &mut ObjectStore) -> Result<()> {
        for record in &mut self.records {
            record.reapply(store)?;
        }
        Ok(())
    }

    /// Objects touched by this transaction, deduplicated, in record order
    pub fn affected_objects(&self) -> Vec<ObjectName> {
        let mut names: Vec<ObjectName> = Vec::new();
        for record in &self.records {
            let name = record.object_name();
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Objects created in this transaction
    pub fn added_objects(&self) -> Vec<ObjectName> {
        self.records
            .iter()
            .filter_map(|r| match r {
                ChangeRecord::ObjectAdded { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Objects removed in this transaction
    pub fn removed_objects(&self) -> Vec<ObjectName> {
        self.records
            .iter()
            .filter_map(|r| match r {
                ChangeRecord::ObjectRemoved { snapshot } => Some(snapshot.name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Estimated byte footprint of all captured state
    pub fn mem_size(&self) -> usize {
        std::mem::size_of::<Transaction>()
            + self.name.len()
            + self.records.iter().map(ChangeRecord::mem_size).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::{Property, PropertyData, Value};

    fn name(s: &str) -> ObjectName {
        ObjectName::from(s)
    }

    fn prop(v: i64) -> Property {
        Property::scalar(Value::Int(v))
    }

    fn change(object: &str, property: &str, before: Option<Property>, after: Option<Property>) -> ChangeRecord {
        ChangeRecord::PropertyChanged {
            object: name(object),
            property: property.to_string(),
            before,
            after,
        }
    }

    #[test]
    fn test_successive_property_changes_collapse() {
        let mut txn = Transaction::new(1, "edit");
        txn.record(change("X", "Len", Some(prop(1)), Some(prop(2))));
        txn.record(change("X", "Len", Some(prop(2)), Some(prop(3))));
        assert_eq!(txn.len(), 1);
        match &txn.records()[0] {
            ChangeRecord::PropertyChanged { before, after, .. } => {
                assert_eq!(before.as_ref().unwrap().data(), &PropertyData::Scalar(Value::Int(1)));
                assert_eq!(after.as_ref().unwrap().data(), &PropertyData::Scalar(Value::Int(3)));
            }
            _ => panic!("expected property change"),
        }
    }

    #[test]
    fn test_collapse_stops_at_lifecycle_record() {
        let mut store = ObjectStore::new();
        let obj = store.insert_new(name("X"), "T").unwrap();
        obj.add_property("Len", prop(1)).unwrap();
        let snapshot = store.get("X").unwrap().snapshot();

        let mut txn = Transaction::new(1, "churn");
        txn.record(change("X", "Len", Some(prop(0)), Some(prop(1))));
        txn.record(ChangeRecord::ObjectRemoved { snapshot });
        txn.record(ChangeRecord::object_added(name("X")));
        txn.record(change("X", "Len", Some(prop(1)), Some(prop(5))));
        // The post-re-add change must not collapse into the pre-removal one
        assert_eq!(txn.len(), 4);
    }

    #[test]
    fn test_revert_runs_in_reverse_order() {
        let mut store = ObjectStore::new();
        let obj = store.insert_new(name("X"), "T").unwrap();
        obj.add_property("A", prop(10)).unwrap();
        obj.add_property("B", prop(20)).unwrap();

        let mut txn = Transaction::new(1, "edit");
        txn.record(change("X", "A", Some(prop(1)), Some(prop(10))));
        txn.record(change("X", "B", Some(prop(2)), Some(prop(20))));
        txn.revert(&mut store).unwrap();

        let x = store.get("X").unwrap();
        assert_eq!(x.property("A").unwrap().data(), &PropertyData::Scalar(Value::Int(1)));
        assert_eq!(x.property("B").unwrap().data(), &PropertyData::Scalar(Value::Int(2)));
    }

    #[test]
    fn test_affected_and_lifecycle_queries() {
        let mut store = ObjectStore::new();
        store.insert_new(name("Y"), "T").unwrap();
        let snapshot = store.get("Y").unwrap().snapshot();

        let mut txn = Transaction::new(1, "mix");
        txn.record(ChangeRecord::object_added(name("X")));
        txn.record(change("X", "Len", None, Some(prop(1))));
        txn.record(ChangeRecord::ObjectRemoved { snapshot });
        assert_eq!(txn.affected_objects(), vec![name("X"), name("Y")]);
        assert_eq!(txn.added_objects(), vec![name("X")]);
        assert_eq!(txn.removed_objects(), vec![name("Y")]);
    }

    #[test]
    fn test_mem_size_sums_records() {
        let mut txn = Transaction::new(1, "big");
        assert!(txn.is_empty());
        txn.record(change(
            "X",
            "Data",
            None,
            Some(Property::scalar(Value::String("z".repeat(300)))),
        ));
        assert!(txn.mem_size() >= 300);
    }
}
