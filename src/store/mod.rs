//! Ledger Store
//!
//! A persisted ledger is the ordered list of retained frames, each with its
//! (handle, object) pairs, cause and digest, plus the allocator's next handle.
//! Loading validates the whole chain before any ledger is built from it.

pub mod file;
pub mod persistence;

pub use file::FileLedgerStore;
pub use persistence::SledLedgerStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{LedgerError, StorageError};
use crate::frame::{Frame, FrameCause};
use crate::ledger::Ledger;
use crate::object::StateObject;
use crate::types::{FrameId, Handle, HandleAllocator, Hash};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Format version written ahead of every persisted archive.
pub const ARCHIVE_VERSION: u32 = 1;

/// One persisted frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub id: FrameId,
    pub parent: Option<FrameId>,
    pub parent_digest: Hash,
    pub objects: Vec<(Handle, StateObject)>,
    pub cause: FrameCause,
    pub digest: Hash,
}

impl FrameRecord {
    pub fn from_frame(frame: &Frame) -> Self {
        FrameRecord {
            id: frame.id(),
            parent: frame.parent(),
            parent_digest: *frame.parent_digest(),
            objects: frame
                .objects()
                .iter()
                .map(|(h, o)| (*h, StateObject::clone(o)))
                .collect(),
            cause: frame.cause().clone(),
            digest: *frame.digest(),
        }
    }

    fn to_frame(&self) -> Result<Frame, LedgerError> {
        let mut objects = BTreeMap::new();
        for (handle, object) in &self.objects {
            if *handle != object.handle() {
                return Err(corrupt(format!(
                    "frame {} files {} under {}",
                    self.id,
                    object.handle(),
                    handle
                )));
            }
            if objects.insert(*handle, Arc::new(object.clone())).is_some() {
                return Err(corrupt(format!("frame {} lists {} twice", self.id, handle)));
            }
        }
        let frame = Frame::seal(
            self.id,
            self.parent,
            self.parent_digest,
            objects,
            self.cause.clone(),
        )?;
        if *frame.digest() != self.digest {
            return Err(corrupt(format!("digest mismatch at {}", self.id)));
        }
        Ok(frame)
    }
}

/// Serializable form of a whole ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerArchive {
    pub next_handle: u64,
    pub frames: Vec<FrameRecord>,
}

fn corrupt(reason: String) -> LedgerError {
    warn!(%reason, "Rejected persisted ledger");
    LedgerError::CorruptLedger(reason)
}

impl LedgerArchive {
    /// Consistent snapshot of the frames visible to the calling thread.
    pub fn capture(ledger: &Ledger) -> Self {
        let state = ledger.read_state();
        let visible = (state.visible_tip().position() - state.origin.position() + 1) as usize;
        LedgerArchive {
            next_handle: state.allocator.watermark(),
            frames: state
                .frames
                .iter()
                .take(visible)
                .map(|f| FrameRecord::from_frame(f))
                .collect(),
        }
    }

    /// Check every structural invariant without building a ledger.
    pub fn validate(&self) -> Result<(), LedgerError> {
        self.rebuild_frames().map(|_| ())
    }

    /// Validate and reassemble. The loaded boundary is frozen.
    pub fn into_ledger(self) -> Result<Ledger, LedgerError> {
        let frames = self.rebuild_frames()?;
        let ledger = Ledger::from_frames(frames, HandleAllocator::resume_at(self.next_handle))?;
        info!(
            origin = ledger.origin().position(),
            tip = ledger.tip().position(),
            next_handle = self.next_handle,
            "Ledger loaded"
        );
        Ok(ledger)
    }

    fn rebuild_frames(&self) -> Result<VecDeque<Arc<Frame>>, LedgerError> {
        let first = self
            .frames
            .first()
            .ok_or_else(|| corrupt("archive holds no frames".to_string()))?;
        if !first.cause.is_boundary() {
            return Err(corrupt(format!("first frame {} is not a boundary", first.id)));
        }
        if first.parent.is_some() {
            return Err(corrupt(format!("boundary {} has a parent", first.id)));
        }

        // Where each handle was created, if the archive still records it.
        let mut created: HashMap<Handle, FrameId> = HashMap::new();
        for record in &self.frames {
            for (handle, object) in &record.objects {
                if !handle_issued(*handle, self.next_handle) {
                    return Err(corrupt(format!(
                        "{} at {} was never issued (next handle is {})",
                        handle, record.id, self.next_handle
                    )));
                }
                let birth = if record.cause.is_boundary() {
                    object.born() <= record.id
                } else {
                    object.born() == record.id
                };
                if birth && !created.contains_key(handle) {
                    created.insert(*handle, record.id);
                } else if birth && record.cause.as_transaction().is_some() {
                    return Err(corrupt(format!(
                        "{} created twice (again at {})",
                        handle, record.id
                    )));
                }
            }
        }

        let mut frames: VecDeque<Arc<Frame>> = VecDeque::with_capacity(self.frames.len());
        let mut seen: HashSet<Handle> = HashSet::new();
        let mut destroyed: HashSet<Handle> = HashSet::new();
        for (offset, record) in self.frames.iter().enumerate() {
            let expected = FrameId::new(first.id.position() + offset as u64);
            if record.id != expected {
                return Err(corrupt(format!(
                    "non-contiguous positions: expected {}, found {}",
                    expected, record.id
                )));
            }

            if let Some(prev) = frames.back() {
                if record.cause.is_boundary() {
                    return Err(corrupt(format!("boundary frame {} after the origin", record.id)));
                }
                if record.parent != Some(prev.id()) || record.parent_digest != prev.link_digest() {
                    return Err(corrupt(format!("broken parent link at {}", record.id)));
                }
            }

            if let Some(descriptor) = record.cause.as_transaction() {
                for handle in descriptor.input.referenced_handles() {
                    let unborn = created.get(&handle).map_or(false, |at| *at >= record.id);
                    if unborn || !handle_issued(handle, self.next_handle) {
                        return Err(corrupt(format!(
                            "descriptor at {} references {} before its creating frame",
                            record.id, handle
                        )));
                    }
                }
            }

            for (handle, object) in &record.objects {
                if destroyed.contains(handle) {
                    return Err(corrupt(format!(
                        "{} changed at {} after destruction",
                        handle, record.id
                    )));
                }
                if !seen.contains(handle) && created.get(handle) != Some(&record.id) {
                    return Err(corrupt(format!(
                        "{} referenced at {} before its creating frame",
                        handle, record.id
                    )));
                }
                seen.insert(*handle);
                if object.is_destroyed() {
                    if record.cause.is_boundary() {
                        return Err(corrupt(format!("boundary {} carries a tombstone", record.id)));
                    }
                    destroyed.insert(*handle);
                }
            }

            frames.push_back(Arc::new(record.to_frame()?));
        }
        Ok(frames)
    }
}

fn handle_issued(handle: Handle, next_handle: u64) -> bool {
    handle.raw() != 0 && handle.raw() < next_handle
}

/// Versioned binary encoding: 4-byte LE version, then bincode.
pub fn encode_archive(archive: &LedgerArchive) -> Result<Vec<u8>, StorageError> {
    let body = bincode::serialize(archive).map_err(|e| StorageError::Encode {
        what: "ledger archive",
        reason: e.to_string(),
    })?;
    let mut bytes = Vec::with_capacity(4 + body.len());
    bytes.extend_from_slice(&ARCHIVE_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub fn decode_archive(bytes: &[u8]) -> Result<LedgerArchive, StorageError> {
    if bytes.len() < 4 {
        return Err(StorageError::Decode {
            what: "ledger archive",
            reason: "file too short".to_string(),
        });
    }
    let version = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if version != ARCHIVE_VERSION {
        return Err(StorageError::UnsupportedVersion(version));
    }
    bincode::deserialize(&bytes[4..]).map_err(|e| StorageError::Decode {
        what: "ledger archive",
        reason: e.to_string(),
    })
}

/// Ledger persistence interface
pub trait LedgerStore {
    fn save(&self, ledger: &Ledger) -> Result<(), LedgerError>;

    /// `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Ledger>, LedgerError>;
}

/// Open the store configured for the workspace at `root`.
pub fn open_store(
    config: &StorageConfig,
    root: &Path,
) -> Result<Box<dyn LedgerStore>, LedgerError> {
    let path = config.resolve_path(root);
    match config.backend {
        StorageBackend::File => Ok(Box::new(FileLedgerStore::new(path))),
        StorageBackend::Sled => Ok(Box::new(SledLedgerStore::new(path)?)),
    }
}
