//! Index tables and their builders.

use super::Index;
use crate::store::{ObjectId, Record};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// Key to identifiers, each list in slot order.
#[derive(Debug)]
pub struct IndexTable<K> {
    entries: HashMap<K, Vec<ObjectId>>,
    len: usize,
}

impl<K: Eq + Hash> IndexTable<K> {
    /// Builds a table from `(key, id)` pairs given in slot order.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (K, ObjectId)>) -> Self {
        let mut entries: HashMap<K, Vec<ObjectId>> = HashMap::new();
        let mut len = 0;
        for (key, id) in pairs {
            entries.entry(key).or_default().push(id);
            len += 1;
        }
        Self { entries, len }
    }

    /// First identifier under `key` in slot order, or [`ObjectId::NONE`].
    #[must_use]
    pub fn first(&self, key: &K) -> ObjectId {
        self.entries
            .get(key)
            .and_then(|ids| ids.first().copied())
            .unwrap_or(ObjectId::NONE)
    }

    /// Every identifier under `key` in slot order.
    #[must_use]
    pub fn matches(&self, key: &K) -> &[ObjectId] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Distinct keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Indexed objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no object is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One freshly built index table with its figures.
pub struct BuiltIndex {
    /// `TypeId` of the index marker.
    pub index_type: TypeId,
    /// Marker type name, for diagnostics.
    pub name: &'static str,
    /// The `IndexTable<Key>`, erased.
    pub table: Arc<dyn Any + Send + Sync>,
    /// Distinct keys.
    pub keys: usize,
    /// Indexed objects.
    pub entries: usize,
}

/// Type-erased index construction for one record type.
pub(crate) trait IndexBuilder<R: Record>: Send + Sync {
    /// Builds the table from committed records in slot order.
    fn build(&self, records: &[(ObjectId, R)]) -> BuiltIndex;
}

/// [`IndexBuilder`] for a concrete [`Index`] marker.
pub(crate) struct TypedIndex<I>(PhantomData<fn() -> I>);

impl<I> TypedIndex<I> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<I: Index> IndexBuilder<I::Record> for TypedIndex<I> {
    fn build(&self, records: &[(ObjectId, I::Record)]) -> BuiltIndex {
        let table = IndexTable::from_pairs(
            records
                .iter()
                .map(|(id, record)| (I::extract(*id, record), *id)),
        );
        BuiltIndex {
            index_type: TypeId::of::<I>(),
            name: std::any::type_name::<I>(),
            keys: table.key_count(),
            entries: table.len(),
            table: Arc::new(table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_is_slot_order() {
        let table = IndexTable::from_pairs([
            ("a", ObjectId::new(0, 0)),
            ("b", ObjectId::new(1, 0)),
            ("a", ObjectId::new(2, 0)),
        ]);

        assert_eq!(table.first(&"a"), ObjectId::new(0, 0));
        assert_eq!(table.matches(&"a"), &[ObjectId::new(0, 0), ObjectId::new(2, 0)]);
        assert_eq!(table.key_count(), 2);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_missing_key() {
        let table: IndexTable<u32> = IndexTable::from_pairs([]);
        assert!(table.first(&7).is_none());
        assert!(table.matches(&7).is_empty());
        assert!(table.is_empty());
    }
}
