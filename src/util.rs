//! Utility functions for prodmap.

use std::fs;
use std::path::Path;

use crate::error::{ProdmapError, Result};

/// Maximum file size that can be read into memory (64 MB).
///
/// Training corpora of tens of thousands of pairs per category stay well
/// under this limit.
pub const MAX_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Read a file into a string with size limit protection.
///
/// # Errors
///
/// Returns an error if the file cannot be read or exceeds [`MAX_FILE_SIZE`].
pub fn read_to_string_limited(path: &Path) -> Result<String> {
    read_to_string_with_limit(path, MAX_FILE_SIZE)
}

/// Read a file into a string with a custom size limit.
///
/// # Errors
///
/// Returns an error if the file exceeds `max_size` or cannot be read.
pub fn read_to_string_with_limit(path: &Path, max_size: u64) -> Result<String> {
    let metadata = fs::metadata(path).map_err(|e| ProdmapError::storage(path, e))?;

    let size = metadata.len();
    if size > max_size {
        return Err(ProdmapError::serde(format!(
            "File {} is too large ({} bytes, max {} bytes)",
            path.display(),
            size,
            max_size
        )));
    }

    fs::read_to_string(path).map_err(|e| ProdmapError::storage(path, e))
}

/// Turn a category name into a file stem.
///
/// Every character that is not alphanumeric, `_`, `-` or whitespace becomes
/// `_`, the result is trimmed, and whitespace runs collapse to a single `_`.
/// Different categories may collide on the same stem; the document itself
/// records the category name, which remains the identity.
pub fn safe_file_name(category: &str) -> String {
    let replaced: String = category
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c.is_whitespace() {
                c
            } else {
                '_'
            }
        })
        .collect();

    let stem = replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    if stem.is_empty() {
        "_".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_read_to_string_limited_success() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.json");
        fs::write(&path, "[]").unwrap();

        assert_eq!(read_to_string_limited(&path).unwrap(), "[]");
    }

    #[test]
    fn test_read_to_string_limited_nonexistent() {
        let temp = TempDir::new().unwrap();
        let result = read_to_string_limited(&temp.path().join("missing.json"));
        assert!(matches!(result, Err(ProdmapError::Storage { .. })));
    }

    #[test]
    fn test_read_to_string_with_limit_exceeds() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("large.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&[b'x'; 1000]).unwrap();

        let err = read_to_string_with_limit(&path, 500).unwrap_err().to_string();
        assert!(err.contains("too large"));
        assert!(err.contains("1000 bytes"));
    }

    #[test]
    fn test_read_to_string_with_limit_at_boundary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("boundary.json");
        fs::write(&path, "x".repeat(100)).unwrap();

        assert!(read_to_string_with_limit(&path, 100).is_ok());
        assert!(read_to_string_with_limit(&path, 99).is_err());
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("Vertikale"), "Vertikale");
        assert_eq!(safe_file_name("Rolety / Dzien-Noc"), "Rolety___Dzien-Noc");
        assert_eq!(safe_file_name("  Plisy  Standard "), "Plisy_Standard");
        assert_eq!(safe_file_name("Żaluzje"), "Żaluzje");
        assert_eq!(safe_file_name("../etc"), "___etc");
        assert_eq!(safe_file_name(""), "_");
    }
}
