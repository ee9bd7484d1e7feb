//! # Type Registry
//!
//! Collects [`TypeDescriptor`]s before the database opens. Each descriptor
//! is erased to a uniform form keyed by its type tag; the database turns
//! them into live storage at open.

use super::entry::{ErasedType, TypeEntry};
use super::TypeDescriptor;
use crate::config::DatabaseConfig;
use crate::error::{DatabaseError, DatabaseResult};
use crate::store::{ObjectTable, Record};
use tracing::debug;

trait ErasedDescriptor {
    fn type_tag(&self) -> u16;
    fn persist_key(&self) -> &'static str;
    fn instantiate(self: Box<Self>, config: &DatabaseConfig) -> Box<dyn ErasedType>;
}

impl<R: Record> ErasedDescriptor for TypeDescriptor<R> {
    fn type_tag(&self) -> u16 {
        R::TYPE_ID
    }

    fn persist_key(&self) -> &'static str {
        R::PERSIST_KEY
    }

    fn instantiate(self: Box<Self>, config: &DatabaseConfig) -> Box<dyn ErasedType> {
        debug!(
            record = std::any::type_name::<R>(),
            type_id = R::TYPE_ID,
            key = R::PERSIST_KEY,
            indices = self.index_count(),
            "Record type instantiated"
        );
        let table = ObjectTable::new(config.segment_size, config.max_objects_per_type);
        Box::new(TypeEntry::new(*self, table))
    }
}

/// Record types to open a database with.
#[derive(Default)]
pub struct Registry {
    descriptors: Vec<Box<dyn ErasedDescriptor>>,
}

impl Registry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record type.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::DuplicateType`] or
    /// [`DatabaseError::DuplicatePersistKey`] if another registered type
    /// already uses `R::TYPE_ID` or `R::PERSIST_KEY`.
    pub fn register<R: Record>(&mut self, descriptor: TypeDescriptor<R>) -> DatabaseResult<&mut Self> {
        if self.descriptors.iter().any(|d| d.type_tag() == R::TYPE_ID) {
            return Err(DatabaseError::DuplicateType(R::TYPE_ID));
        }
        if self.descriptors.iter().any(|d| d.persist_key() == R::PERSIST_KEY) {
            return Err(DatabaseError::DuplicatePersistKey(R::PERSIST_KEY));
        }
        self.descriptors.push(Box::new(descriptor));
        Ok(self)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Persistence keys in registration order.
    #[must_use]
    pub fn persist_keys(&self) -> Vec<&'static str> {
        self.descriptors.iter().map(|d| d.persist_key()).collect()
    }

    pub(crate) fn instantiate(self, config: &DatabaseConfig) -> Vec<Box<dyn ErasedType>> {
        self.descriptors
            .into_iter()
            .map(|d| d.instantiate(config))
            .collect()
    }
}
