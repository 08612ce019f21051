//! Instance registry for queryable record types.
//!
//! A variable declared without an explicit domain draws its candidates from
//! here. The registry is an explicit object handed to the evaluator; there is
//! no process-global instance list.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::error::{QueryError, Result};
use crate::reflect::TypeCatalog;
use crate::value::{RecordId, RecordRef, Value};

#[derive(Debug, Default)]
struct Instances {
    records: Vec<RecordRef>,
    ids: FxHashSet<RecordId>,
}

/// Registry of live records, in insertion order.
#[derive(Debug, Default)]
pub struct SymbolGraph {
    inner: RwLock<Instances>,
}

impl SymbolGraph {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `record`. Inserting the same record twice is a no-op.
    pub fn insert(&self, record: &RecordRef) {
        let mut inner = self.inner.write();
        if inner.ids.insert(record.id()) {
            inner.records.push(Arc::clone(record));
        }
    }

    /// Tracks every record of `records`.
    pub fn extend<'a, I>(&self, records: I)
    where
        I: IntoIterator<Item = &'a RecordRef>,
    {
        for record in records {
            self.insert(record);
        }
    }

    /// Stops tracking the record with `id`.
    pub fn remove(&self, id: RecordId) -> bool {
        let mut inner = self.inner.write();
        if !inner.ids.remove(&id) {
            return false;
        }
        inner.records.retain(|record| record.id() != id);
        true
    }

    /// Number of tracked records.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Whether no record is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of tracked instances of `ty` and its subtypes, in insertion
    /// order. Fails with [`QueryError::DomainUnavailable`] when `ty` is not
    /// queryable.
    pub fn instances_of(&self, catalog: &TypeCatalog, var: &str, ty: &str) -> Result<Vec<Value>> {
        if !catalog.is_queryable(ty) {
            return Err(QueryError::DomainUnavailable {
                var: var.to_owned(),
                ty: ty.to_owned(),
            });
        }
        let inner = self.inner.read();
        let found: Vec<Value> = inner
            .records
            .iter()
            .filter(|record| catalog.is_subtype(record.type_name(), ty))
            .map(|record| Value::Record(Arc::clone(record)))
            .collect();
        trace!(ty, count = found.len(), "registry domain snapshot");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::RecordType;
    use crate::value::Record;

    #[test]
    fn snapshots_include_subtypes_in_insertion_order() -> Result<()> {
        let mut catalog = TypeCatalog::new();
        catalog.register_record(RecordType::new("Body").queryable())?;
        catalog.register_record(RecordType::new("Handle").extends("Body"))?;
        catalog.register_record(RecordType::new("Note"))?;
        let graph = SymbolGraph::new();
        let a = Record::new("Handle", [("name", "H1")]);
        let b = Record::new("Body", [("name", "B1")]);
        let note = Record::new("Note", Vec::<(&str, Value)>::new());
        graph.extend([&a, &b, &a, &note]);
        assert_eq!(graph.len(), 3);
        let bodies = graph.instances_of(&catalog, "b", "Body")?;
        assert_eq!(bodies, vec![Value::from(&a), Value::from(&b)]);
        let handles = graph.instances_of(&catalog, "h", "Handle")?;
        assert_eq!(handles, vec![Value::from(&a)]);
        assert!(matches!(
            graph.instances_of(&catalog, "n", "Note"),
            Err(QueryError::DomainUnavailable { .. })
        ));
        assert!(graph.remove(a.id()));
        assert_eq!(graph.instances_of(&catalog, "b", "Body")?.len(), 1);
        Ok(())
    }
}
