//! In-memory mapping storage for testing.
//!
//! This module provides a thread-safe in-memory implementation of the
//! MappingStore trait, primarily for use in unit tests and dry runs.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::core::MappingDefinition;
use crate::error::{ProdmapError, Result};
use crate::storage::traits::UpdateFn;
use crate::storage::MappingStore;

/// In-memory mapping store.
///
/// Thread-safe implementation using `RwLock<BTreeMap>`. `update` holds the
/// write lock for the whole read-modify-write cycle.
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    mappings: RwLock<BTreeMap<String, MappingDefinition>>,
}

impl MemoryMappingStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of mappings in the store.
    pub fn len(&self) -> usize {
        self.mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MappingStore for MemoryMappingStore {
    fn get(&self, category: &str) -> Result<Option<MappingDefinition>> {
        let mappings = self.mappings.read().unwrap_or_else(PoisonError::into_inner);
        Ok(mappings.get(category).cloned())
    }

    fn put(&self, definition: &MappingDefinition) -> Result<()> {
        definition.validate()?;
        let mut mappings = self.mappings.write().unwrap_or_else(PoisonError::into_inner);
        mappings.insert(definition.category.clone(), definition.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<MappingDefinition>> {
        let mappings = self.mappings.read().unwrap_or_else(PoisonError::into_inner);
        Ok(mappings.values().cloned().collect())
    }

    fn delete(&self, category: &str) -> Result<()> {
        let mut mappings = self.mappings.write().unwrap_or_else(PoisonError::into_inner);
        mappings.remove(category);
        Ok(())
    }

    fn update(&self, category: &str, apply: &mut UpdateFn<'_>) -> Result<MappingDefinition> {
        let mut mappings = self.mappings.write().unwrap_or_else(PoisonError::into_inner);

        let updated = apply(mappings.get(category).cloned())?;
        if updated.category != category {
            return Err(ProdmapError::invalid_mapping(
                category,
                format!("update produced the mapping of '{}'", updated.category),
            ));
        }
        updated.validate()?;
        mappings.insert(category.to_string(), updated.clone());

        Ok(updated)
    }
}
