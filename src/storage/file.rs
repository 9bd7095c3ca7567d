//! File-based mapping storage for prodmap.
//!
//! Mappings are stored as one JSON document per category in
//! `~/.prodmap/mappings/` (or the configured directory). Writes go through a
//! temp file + rename so a reader never sees a half-written document, and
//! read-modify-write cycles hold an exclusive lock on a per-category lock
//! file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::Config;
use crate::core::MappingDefinition;
use crate::error::{ProdmapError, Result};
use crate::storage::traits::UpdateFn;
use crate::storage::MappingStore;
use crate::util::{read_to_string_limited, safe_file_name};

/// File-based mapping storage.
#[derive(Debug, Clone)]
pub struct FileMappingStore {
    /// Directory where mapping documents are stored.
    mappings_dir: PathBuf,
}

/// Exclusive lock on one category, released on drop.
struct CategoryLock {
    file: File,
    path: PathBuf,
}

impl CategoryLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| ProdmapError::storage(&path, e))?;
        file.lock_exclusive()
            .map_err(|e| ProdmapError::lock(&path, e.to_string()))?;
        Ok(Self { file, path })
    }
}

impl Drop for CategoryLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

impl FileMappingStore {
    /// Create a store in the configured mappings directory.
    pub fn new(config: &Config) -> Result<Self> {
        let dir = config.mappings_dir().ok_or_else(|| {
            ProdmapError::config("Could not determine mappings directory (no home directory)")
        })?;
        Self::with_dir(dir)
    }

    /// Create a store in a custom directory.
    pub fn with_dir(mappings_dir: impl Into<PathBuf>) -> Result<Self> {
        let mappings_dir = mappings_dir.into();

        if !mappings_dir.exists() {
            fs::create_dir_all(&mappings_dir)
                .map_err(|e| ProdmapError::storage(&mappings_dir, e))?;
        }

        Ok(Self { mappings_dir })
    }

    /// Directory holding the documents.
    pub fn dir(&self) -> &Path {
        &self.mappings_dir
    }

    /// Get the path for a category's document.
    pub fn mapping_path(&self, category: &str) -> PathBuf {
        self.mappings_dir
            .join(format!("{}.json", safe_file_name(category)))
    }

    fn temp_path(&self, category: &str) -> PathBuf {
        self.mappings_dir
            .join(format!(".{}.json.tmp", safe_file_name(category)))
    }

    fn lock_path(&self, category: &str) -> PathBuf {
        self.mappings_dir
            .join(format!(".{}.lock", safe_file_name(category)))
    }

    fn read_document(path: &Path) -> Result<std::result::Result<MappingDefinition, String>> {
        let content = read_to_string_limited(path)?;
        Ok(serde_json::from_str::<MappingDefinition>(&content).map_err(|e| e.to_string()))
    }

    /// Read and validate the document at a category's path.
    ///
    /// Safe file names can collide, so a document naming another category
    /// is rejected rather than returned.
    fn load(&self, category: &str) -> Result<Option<MappingDefinition>> {
        let path = self.mapping_path(category);
        if !path.exists() {
            return Ok(None);
        }

        let definition = Self::read_document(&path)?
            .map_err(|message| ProdmapError::invalid_mapping(category, message))?;
        if definition.category != category {
            return Err(ProdmapError::invalid_mapping(
                category,
                format!(
                    "{} holds the mapping of '{}'",
                    path.display(),
                    definition.category
                ),
            ));
        }
        definition.validate()?;
        Ok(Some(definition))
    }

    /// Write a document atomically using temp file + rename.
    ///
    /// Callers hold the category lock.
    fn atomic_write(&self, definition: &MappingDefinition) -> Result<()> {
        let final_path = self.mapping_path(&definition.category);
        let temp_path = self.temp_path(&definition.category);

        let json = serde_json::to_string_pretty(definition)?;

        {
            let mut file =
                File::create(&temp_path).map_err(|e| ProdmapError::storage(&temp_path, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| ProdmapError::storage(&temp_path, e))?;
            file.write_all(b"\n")
                .map_err(|e| ProdmapError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| ProdmapError::storage(&temp_path, e))?;
        }

        fs::rename(&temp_path, &final_path).map_err(|e| ProdmapError::storage(&final_path, e))?;

        Ok(())
    }

    fn check_owner(&self, definition: &MappingDefinition) -> Result<()> {
        let path = self.mapping_path(&definition.category);
        if !path.exists() {
            return Ok(());
        }
        if let Ok(existing) = Self::read_document(&path)? {
            if existing.category != definition.category {
                return Err(ProdmapError::invalid_mapping(
                    &definition.category,
                    format!(
                        "file name collides with the mapping of '{}'",
                        existing.category
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl MappingStore for FileMappingStore {
    fn get(&self, category: &str) -> Result<Option<MappingDefinition>> {
        self.load(category)
    }

    fn put(&self, definition: &MappingDefinition) -> Result<()> {
        definition.validate()?;
        let _lock = CategoryLock::acquire(self.lock_path(&definition.category))?;
        self.check_owner(definition)?;
        self.atomic_write(definition)
    }

    fn list(&self) -> Result<Vec<MappingDefinition>> {
        if !self.mappings_dir.exists() {
            return Ok(Vec::new());
        }

        let mut definitions = Vec::new();

        let entries = fs::read_dir(&self.mappings_dir)
            .map_err(|e| ProdmapError::storage(&self.mappings_dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| ProdmapError::storage(&self.mappings_dir, e))?;
            let path = entry.path();

            // Skip non-JSON files, temp files and lock files
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            if path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true)
            {
                continue;
            }

            match Self::read_document(&path) {
                Ok(Ok(definition)) => match definition.validate() {
                    Ok(()) => definitions.push(definition),
                    Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
                },
                Ok(Err(message)) => {
                    tracing::warn!("Skipping unparseable mapping {}: {}", path.display(), message)
                }
                Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
            }
        }

        definitions.sort_by(|a, b| a.category.cmp(&b.category));

        Ok(definitions)
    }

    fn delete(&self, category: &str) -> Result<()> {
        let _lock = CategoryLock::acquire(self.lock_path(category))?;

        // Only remove the document if it belongs to this category
        if self.load(category)?.is_some() {
            let path = self.mapping_path(category);
            fs::remove_file(&path).map_err(|e| ProdmapError::storage(&path, e))?;
        }

        let temp_path = self.temp_path(category);
        if temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
        }

        Ok(())
    }

    fn update(&self, category: &str, apply: &mut UpdateFn<'_>) -> Result<MappingDefinition> {
        let _lock = CategoryLock::acquire(self.lock_path(category))?;

        let current = self.load(category)?;
        let updated = apply(current)?;
        if updated.category != category {
            return Err(ProdmapError::invalid_mapping(
                category,
                format!("update produced the mapping of '{}'", updated.category),
            ));
        }
        updated.validate()?;
        self.atomic_write(&updated)?;

        Ok(updated)
    }
}
