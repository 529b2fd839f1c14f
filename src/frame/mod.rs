//! Frames
//!
//! A frame is one committed step of the ledger: the post-change versions of the
//! objects touched at that step plus exactly one cause. Frames are immutable
//! once committed. The single exception is an unfrozen boundary frame at the
//! tip, amended in place under the ledger's exclusive lock.

pub mod builder;
pub mod digest;

pub use builder::FrameBuilder;

use crate::error::StorageError;
use crate::object::StateObject;
use crate::transaction::{InterruptionPhase, TransactionDescriptor};
use crate::types::{FrameId, Handle, Hash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Synthetic descriptor carried by boundary frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    /// Origin of the prefix this boundary replaced.
    pub compacted_from: FrameId,
    /// Last position folded into the boundary (the boundary's own position).
    pub through: FrameId,
    /// Live objects carried through.
    pub retained: u64,
    /// Live objects dropped by the retention policy.
    pub dropped: u64,
    /// Chain digest of the frame that stood at `through` before compaction.
    /// `None` for the genesis boundary.
    pub anchor: Option<Hash>,
}

impl ArchiveDescriptor {
    pub fn genesis() -> Self {
        ArchiveDescriptor {
            compacted_from: FrameId::GENESIS,
            through: FrameId::GENESIS,
            retained: 0,
            dropped: 0,
            anchor: None,
        }
    }
}

/// Why a frame exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameCause {
    Transaction(TransactionDescriptor),
    Archive(ArchiveDescriptor),
}

impl FrameCause {
    pub fn as_transaction(&self) -> Option<&TransactionDescriptor> {
        match self {
            FrameCause::Transaction(d) => Some(d),
            FrameCause::Archive(_) => None,
        }
    }

    pub fn as_archive(&self) -> Option<&ArchiveDescriptor> {
        match self {
            FrameCause::Archive(a) => Some(a),
            FrameCause::Transaction(_) => None,
        }
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, FrameCause::Archive(_))
    }

    /// Interruption phase for transaction frames.
    pub fn phase(&self) -> Option<InterruptionPhase> {
        self.as_transaction().map(|d| d.phase)
    }

    /// Short label for listings.
    pub fn label(&self) -> &str {
        match self {
            FrameCause::Transaction(d) => d.action(),
            FrameCause::Archive(_) => "<archive>",
        }
    }
}

/// One committed step of the ledger
#[derive(Debug, Clone)]
pub struct Frame {
    id: FrameId,
    parent: Option<FrameId>,
    parent_digest: Hash,
    objects: BTreeMap<Handle, Arc<StateObject>>,
    cause: FrameCause,
    digest: Hash,
}

impl Frame {
    /// Build a frame and compute its digest.
    pub(crate) fn seal(
        id: FrameId,
        parent: Option<FrameId>,
        parent_digest: Hash,
        objects: BTreeMap<Handle, Arc<StateObject>>,
        cause: FrameCause,
    ) -> Result<Self, StorageError> {
        let digest = digest::compute_frame_digest(id, parent, &parent_digest, &objects, &cause)?;
        Ok(Frame {
            id,
            parent,
            parent_digest,
            objects,
            cause,
            digest,
        })
    }

    pub(crate) fn genesis() -> Result<Self, StorageError> {
        Frame::seal(
            FrameId::GENESIS,
            None,
            [0u8; 32],
            BTreeMap::new(),
            FrameCause::Archive(ArchiveDescriptor::genesis()),
        )
    }

    /// Recompute the digest after an in-place boundary amendment.
    pub(crate) fn reseal(&mut self) -> Result<(), StorageError> {
        self.digest = digest::compute_frame_digest(
            self.id,
            self.parent,
            &self.parent_digest,
            &self.objects,
            &self.cause,
        )?;
        Ok(())
    }

    pub(crate) fn objects_mut(&mut self) -> &mut BTreeMap<Handle, Arc<StateObject>> {
        &mut self.objects
    }

    pub(crate) fn cause_mut(&mut self) -> &mut FrameCause {
        &mut self.cause
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    /// Link digest of the parent at the time this frame was committed.
    pub fn parent_digest(&self) -> &Hash {
        &self.parent_digest
    }

    /// Objects changed at this step, in handle order.
    pub fn objects(&self) -> &BTreeMap<Handle, Arc<StateObject>> {
        &self.objects
    }

    pub fn object(&self, handle: Handle) -> Option<&Arc<StateObject>> {
        self.objects.get(&handle)
    }

    pub fn mentions(&self, handle: Handle) -> bool {
        self.objects.contains_key(&handle)
    }

    pub fn cause(&self) -> &FrameCause {
        &self.cause
    }

    pub fn digest(&self) -> &Hash {
        &self.digest
    }

    /// Digest successors chain from.
    ///
    /// A compacted boundary keeps the chain anchored at the digest of the frame
    /// it replaced, so frames after it stay verifiable.
    pub fn link_digest(&self) -> Hash {
        match &self.cause {
            FrameCause::Archive(ArchiveDescriptor {
                anchor: Some(anchor),
                ..
            }) => *anchor,
            _ => self.digest,
        }
    }

    pub fn is_boundary(&self) -> bool {
        self.cause.is_boundary()
    }
}
