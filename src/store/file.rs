//! Single-file ledger store
//!
//! The whole archive is written to one file: 4-byte version header, then
//! bincode. Writes go to a temporary sibling and are renamed into place.

use crate::error::{LedgerError, StorageError};
use crate::ledger::Ledger;
use crate::store::{decode_archive, encode_archive, LedgerArchive, LedgerStore};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileLedgerStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create parent directory {:?}: {}", parent, e),
                ))
            })?;
        }

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, bytes).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to write ledger to {:?}: {}", temp_path, e),
            ))
        })?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to rename temp file to {:?}: {}", self.path, e),
            ))
        })?;
        Ok(())
    }
}

impl LedgerStore for FileLedgerStore {
    fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let archive = LedgerArchive::capture(ledger);
        let bytes = encode_archive(&archive)?;
        self.write_atomic(&bytes)?;
        info!(
            path = %self.path.display(),
            frames = archive.frames.len(),
            bytes = bytes.len(),
            "Ledger saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<Ledger>, LedgerError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to read ledger from {:?}: {}", self.path, e),
            ))
        })?;
        let archive = decode_archive(&bytes)?;
        archive.into_ledger().map(Some)
    }
}
