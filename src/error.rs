//! Unified error types for prodmap.
//!
//! Only a handful of conditions are fatal, and each of them is fatal for a
//! single category at most: an empty or corrupt training corpus, or a
//! structurally invalid persisted mapping. Everything else (unresolved keys,
//! lookup misses, gateway outages) is reported as data next to the batch's
//! successful output, so most callers convert errors into warnings with
//! [`FailOpen`] rather than propagating them.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for prodmap operations.
#[derive(Error, Debug)]
pub enum ProdmapError {
    /// I/O errors from corpus, order or mapping files.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or TOML parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// A category's training set is empty or unusable.
    #[error("corrupt training corpus for '{category}': {message}")]
    CorruptCorpus { category: String, message: String },

    /// A persisted mapping document failed structural validation.
    #[error("invalid mapping for '{category}': {message}")]
    InvalidMapping { category: String, message: String },

    /// No trained category matched an incoming record and no suggestion was
    /// available.
    #[error("category unresolved: '{label}'")]
    CategoryUnresolved { label: String },

    /// The external suggestion gateway failed, timed out or is disabled.
    #[error("gateway '{gateway}' unavailable: {message}")]
    GatewayUnavailable { gateway: String, message: String },

    /// The gateway answered, but the answer could not be read.
    #[error("gateway '{gateway}' returned an unreadable reply: {message}")]
    GatewayReply { gateway: String, message: String },

    /// Exclusive acquisition of a category mapping failed.
    #[error("lock error at {path}: {message}")]
    Lock { path: PathBuf, message: String },
}

/// A specialized Result type for prodmap operations.
pub type Result<T> = std::result::Result<T, ProdmapError>;

impl ProdmapError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a corrupt corpus error.
    pub fn corrupt_corpus(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptCorpus {
            category: category.into(),
            message: message.into(),
        }
    }

    /// Create an invalid mapping error.
    pub fn invalid_mapping(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidMapping {
            category: category.into(),
            message: message.into(),
        }
    }

    /// Create a category unresolved error.
    pub fn category_unresolved(label: impl Into<String>) -> Self {
        Self::CategoryUnresolved {
            label: label.into(),
        }
    }

    /// Create a gateway unavailable error.
    pub fn gateway_unavailable(gateway: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GatewayUnavailable {
            gateway: gateway.into(),
            message: message.into(),
        }
    }

    /// Create an unreadable gateway reply error.
    pub fn gateway_reply(gateway: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GatewayReply {
            gateway: gateway.into(),
            message: message.into(),
        }
    }

    /// Create a lock error.
    pub fn lock(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Lock {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts processing of the category it occurred in.
    ///
    /// Fatal errors never abort other categories or records.
    pub fn is_fatal_for_category(&self) -> bool {
        matches!(
            self,
            Self::CorruptCorpus { .. } | Self::InvalidMapping { .. }
        )
    }

    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::GatewayUnavailable { .. } | Self::Lock { .. })
    }
}

impl From<io::Error> for ProdmapError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for ProdmapError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Degrade an error into a fallback value instead of propagating it.
///
/// Used at the isolation boundaries: a failed gateway call becomes a
/// `manual` entry, a failed record becomes a skipped item.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (using default)", context, err);
                T::default()
            }
        }
    }
}

/// Process exit codes for the `prodmap` binary.
pub mod exit_codes {
    /// Everything succeeded.
    pub const SUCCESS: i32 = 0;

    /// The command could not run at all (bad input file, unreadable store).
    pub const ERROR: i32 = 1;

    /// The batch finished but some categories or items failed.
    pub const PARTIAL: i32 = 2;

    /// The process panicked.
    pub const CRASH: i32 = 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = ProdmapError::storage(
            "/tmp/mappings/Vertikale.json",
            io::Error::new(io::ErrorKind::NotFound, "file not found"),
        );
        assert!(err.to_string().contains("storage error"));
        assert!(err.to_string().contains("/tmp/mappings/Vertikale.json"));
    }

    #[test]
    fn test_corrupt_corpus_display() {
        let err = ProdmapError::corrupt_corpus("Plisy", "no training pairs");
        assert_eq!(
            err.to_string(),
            "corrupt training corpus for 'Plisy': no training pairs"
        );
    }

    #[test]
    fn test_category_unresolved_display() {
        let err = ProdmapError::category_unresolved("Markiza");
        assert_eq!(err.to_string(), "category unresolved: 'Markiza'");
    }

    #[test]
    fn test_gateway_unavailable_display() {
        let err = ProdmapError::gateway_unavailable("command", "timed out after 30s");
        assert_eq!(
            err.to_string(),
            "gateway 'command' unavailable: timed out after 30s"
        );
    }

    #[test]
    fn test_fatal_for_category() {
        assert!(ProdmapError::corrupt_corpus("a", "b").is_fatal_for_category());
        assert!(ProdmapError::invalid_mapping("a", "b").is_fatal_for_category());
        assert!(!ProdmapError::category_unresolved("a").is_fatal_for_category());
        assert!(!ProdmapError::gateway_unavailable("a", "b").is_fatal_for_category());
    }

    #[test]
    fn test_transient() {
        assert!(ProdmapError::gateway_unavailable("openai", "503").is_transient());
        assert!(!ProdmapError::config("bad").is_transient());
        assert!(!ProdmapError::gateway_reply("openai", "not json").is_transient());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: ProdmapError = io_err.into();
        assert!(matches!(err, ProdmapError::Storage { .. }));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ProdmapError = json_err.into();
        assert!(matches!(err, ProdmapError::Serde { .. }));
    }

    #[test]
    fn test_fail_open_default() {
        let result: Result<Vec<String>> = Err(ProdmapError::gateway_unavailable("x", "down"));
        let value = result.fail_open_default("test context");
        assert!(value.is_empty());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_codes::SUCCESS, 0);
        assert_eq!(exit_codes::ERROR, 1);
        assert_eq!(exit_codes::PARTIAL, 2);
        assert_eq!(exit_codes::CRASH, 3);
    }

    #[test]
    fn test_fail_open_success() {
        let result: Result<i32> = Ok(100);
        assert_eq!(result.fail_open_default("test context"), 100);
    }
}
