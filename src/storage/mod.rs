//! Mapping storage for prodmap.
//!
//! This module provides persistence for per-category mapping documents,
//! supporting file-based and in-memory backends, plus the merge rules that
//! reconcile re-learning with stored suggestions.

pub mod file;
pub mod memory;
pub mod merge;
pub mod traits;

pub use file::FileMappingStore;
pub use memory::MemoryMappingStore;
pub use merge::{merge_learned, merge_suggestion, MergeOutcome};
pub use traits::{MappingStore, UpdateFn};
