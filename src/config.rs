//! Configuration System
//!
//! Layered configuration: built-in defaults, the global file, the workspace
//! file, then `ANNAL_` environment variables. Every section defaults, so an
//! empty or missing file yields a usable configuration.

use crate::compaction::CompactionConfig;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnalConfig {
    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub compaction: CompactionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transaction pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Deepest reaction chain a submission may open.
    #[serde(default = "default_max_reaction_depth")]
    pub max_reaction_depth: usize,

    /// Mixed into every outcome draw. Peers replaying each other's inputs
    /// must agree on it.
    #[serde(default)]
    pub seed: u64,
}

fn default_max_reaction_depth() -> usize {
    16
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            max_reaction_depth: default_max_reaction_depth(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Single archive file, replaced atomically on save.
    #[default]
    File,
    /// sled database with one key per frame.
    Sled,
}

/// Where the ledger is persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Relative paths resolve against the workspace root.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(".annal/ledger")
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

impl StorageConfig {
    pub fn resolve_path(&self, workspace_root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            workspace_root.join(&self.path)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Ledger(String),
    Compaction(String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Ledger(msg) => write!(f, "Ledger: {}", msg),
            ValidationError::Compaction(msg) => write!(f, "Compaction: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl AnnalConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.ledger.max_reaction_depth == 0 {
            errors.push(ValidationError::Ledger(
                "max_reaction_depth must be at least 1".to_string(),
            ));
        }

        let compaction = &self.compaction;
        if compaction.max_retained_frames == 0 {
            errors.push(ValidationError::Compaction(
                "max_retained_frames must be at least 1".to_string(),
            ));
        }
        if compaction.keep_recent >= compaction.max_retained_frames {
            errors.push(ValidationError::Compaction(format!(
                "keep_recent ({}) must be below max_retained_frames ({})",
                compaction.keep_recent, compaction.max_retained_frames
            )));
        }
        if compaction.drop_kinds.iter().any(|k| k.trim().is_empty()) {
            errors.push(ValidationError::Compaction(
                "drop_kinds cannot contain an empty kind".to_string(),
            ));
        }

        if self.storage.path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage("path cannot be empty".to_string()));
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
