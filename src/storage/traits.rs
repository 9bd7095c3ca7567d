//! Mapping storage traits for prodmap.
//!
//! This module defines the `MappingStore` trait for mapping document
//! persistence.

use std::sync::Arc;

use crate::core::MappingDefinition;
use crate::error::Result;

/// Callback applied to a category's stored mapping under exclusive access.
///
/// Receives the current document (if any) and returns the document to store.
pub type UpdateFn<'a> =
    dyn FnMut(Option<MappingDefinition>) -> Result<MappingDefinition> + 'a;

/// Trait for mapping storage backends.
///
/// One document per category; the category name is the identity.
pub trait MappingStore: Send + Sync {
    /// Retrieve the mapping of a category.
    ///
    /// Returns `Ok(None)` if the category has no mapping. A document that
    /// exists but fails validation is an `InvalidMapping` error.
    fn get(&self, category: &str) -> Result<Option<MappingDefinition>>;

    /// Save a mapping, replacing any existing document for its category.
    fn put(&self, definition: &MappingDefinition) -> Result<()>;

    /// List all valid mappings, sorted by category.
    ///
    /// Invalid documents are skipped with a warning.
    fn list(&self) -> Result<Vec<MappingDefinition>>;

    /// Delete a category's mapping.
    ///
    /// Returns `Ok(())` even if the mapping doesn't exist.
    fn delete(&self, category: &str) -> Result<()>;

    /// Read-modify-write one category's mapping under exclusive access.
    ///
    /// This is the single merge point for concurrent learners and gateway
    /// suggestions. The stored result is returned.
    fn update(&self, category: &str, apply: &mut UpdateFn<'_>) -> Result<MappingDefinition>;

    /// Names of all stored categories, sorted.
    fn categories(&self) -> Result<Vec<String>> {
        Ok(self.list()?.into_iter().map(|d| d.category).collect())
    }

    /// Check if a category has a mapping.
    fn exists(&self, category: &str) -> Result<bool> {
        Ok(self.get(category)?.is_some())
    }
}

/// Blanket implementation of MappingStore for Arc-wrapped stores.
///
/// This allows sharing one store between the learning and translation sides
/// of an engine and its tests.
impl<T: MappingStore + ?Sized> MappingStore for Arc<T> {
    fn get(&self, category: &str) -> Result<Option<MappingDefinition>> {
        (**self).get(category)
    }

    fn put(&self, definition: &MappingDefinition) -> Result<()> {
        (**self).put(definition)
    }

    fn list(&self) -> Result<Vec<MappingDefinition>> {
        (**self).list()
    }

    fn delete(&self, category: &str) -> Result<()> {
        (**self).delete(category)
    }

    fn update(&self, category: &str, apply: &mut UpdateFn<'_>) -> Result<MappingDefinition> {
        (**self).update(category, apply)
    }
}
