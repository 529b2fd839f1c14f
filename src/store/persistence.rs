//! Sled-backed ledger store
//!
//! Frames live in the `frames` tree keyed by big-endian position, so sled's
//! key order is ledger order. Each value is a bincode `FrameRecord`. The
//! format version and the allocator's next handle live in the default tree.

use crate::error::{LedgerError, StorageError};
use crate::ledger::Ledger;
use crate::store::{FrameRecord, LedgerArchive, LedgerStore, ARCHIVE_VERSION};
use std::path::Path;
use tracing::info;

const FRAMES_TREE: &str = "frames";
const VERSION_KEY: &[u8] = b"meta:version";
const NEXT_HANDLE_KEY: &[u8] = b"meta:next_handle";

pub struct SledLedgerStore {
    db: sled::Db,
    frames: sled::Tree,
}

impl SledLedgerStore {
    /// Open (or create) the database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::Database(format!("Failed to open sled database: {}", e))
        })?;
        let frames = db.open_tree(FRAMES_TREE)?;
        Ok(Self { db, frames })
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Number of persisted frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn read_u64(&self, key: &[u8]) -> Result<Option<u64>, StorageError> {
        match self.db.get(key)? {
            Some(value) => {
                let bytes: [u8; 8] = (&value[..]).try_into().map_err(|_| StorageError::Decode {
                    what: "sled metadata",
                    reason: format!("expected 8 bytes, found {}", value.len()),
                })?;
                Ok(Some(u64::from_le_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl LedgerStore for SledLedgerStore {
    fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let archive = LedgerArchive::capture(ledger);
        let (origin, tip) = match (archive.frames.first(), archive.frames.last()) {
            (Some(first), Some(last)) => (first.id.position(), last.id.position()),
            _ => return Err(LedgerError::CorruptLedger("ledger holds no frames".to_string())),
        };

        let mut batch = sled::Batch::default();
        // Compacted prefixes and retracted interrupt frames.
        for key in self.frames.iter().keys() {
            let key = key.map_err(StorageError::from)?;
            let position = decode_key(&key)?;
            if position < origin || position > tip {
                batch.remove(key);
            }
        }
        for record in &archive.frames {
            let value = bincode::serialize(record).map_err(|e| StorageError::Encode {
                what: "frame record",
                reason: e.to_string(),
            })?;
            batch.insert(record.id.position().to_be_bytes().to_vec(), value);
        }
        self.frames.apply_batch(batch).map_err(StorageError::from)?;

        self.db
            .insert(VERSION_KEY, u64::from(ARCHIVE_VERSION).to_le_bytes().to_vec())
            .map_err(StorageError::from)?;
        self.db
            .insert(NEXT_HANDLE_KEY, archive.next_handle.to_le_bytes().to_vec())
            .map_err(StorageError::from)?;
        self.flush()?;

        info!(frames = archive.frames.len(), origin, tip, "Ledger saved to sled");
        Ok(())
    }

    fn load(&self) -> Result<Option<Ledger>, LedgerError> {
        if self.frames.is_empty() {
            return Ok(None);
        }
        match self.read_u64(VERSION_KEY)? {
            Some(v) if v == u64::from(ARCHIVE_VERSION) => {}
            Some(v) => return Err(StorageError::UnsupportedVersion(v as u32).into()),
            None => {
                return Err(LedgerError::CorruptLedger(
                    "sled store has frames but no format version".to_string(),
                ))
            }
        }
        let next_handle = self.read_u64(NEXT_HANDLE_KEY)?.ok_or_else(|| {
            LedgerError::CorruptLedger("sled store has no next handle".to_string())
        })?;

        let mut frames = Vec::with_capacity(self.frames.len());
        for item in self.frames.iter() {
            let (key, value) = item.map_err(StorageError::from)?;
            let record: FrameRecord =
                bincode::deserialize(&value).map_err(|e| StorageError::Decode {
                    what: "frame record",
                    reason: e.to_string(),
                })?;
            if decode_key(&key)? != record.id.position() {
                return Err(LedgerError::CorruptLedger(format!(
                    "frame {} stored under the wrong key",
                    record.id
                )));
            }
            frames.push(record);
        }

        LedgerArchive { next_handle, frames }.into_ledger().map(Some)
    }
}

fn decode_key(key: &[u8]) -> Result<u64, StorageError> {
    let bytes: [u8; 8] = key.try_into().map_err(|_| StorageError::Decode {
        what: "frame key",
        reason: format!("expected 8 bytes, found {}", key.len()),
    })?;
    Ok(u64::from_be_bytes(bytes))
}
