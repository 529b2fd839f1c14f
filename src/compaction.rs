//! Compaction
//!
//! Collapses the prefix `origin..=through` into a single boundary frame that
//! holds the live set visible at `through`, filtered by a retention policy.
//! The boundary keeps position `through`, so later frame ids never move.
//!
//! The most recent boundary may be amended in place while the amendment lock
//! is held and it is still the tip. That is also how initial world state is
//! seeded into the genesis boundary.

use crate::concurrency::Exclusive;
use crate::error::LedgerError;
use crate::frame::{ArchiveDescriptor, Frame, FrameCause};
use crate::ledger::{Ledger, LedgerState};
use crate::object::{ObjectKind, StateObject};
use crate::types::{FrameId, Handle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info};

/// Decides which live objects survive into a boundary frame.
pub trait RetentionPolicy {
    fn retain(&self, object: &StateObject) -> bool;
}

/// Keep every live object.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetainAll;

impl RetentionPolicy for RetainAll {
    fn retain(&self, _object: &StateObject) -> bool {
        true
    }
}

/// Drop objects whose kind is listed.
#[derive(Debug, Clone, Default)]
pub struct DropKinds {
    kinds: BTreeSet<ObjectKind>,
}

impl DropKinds {
    pub fn new<I, K>(kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ObjectKind>,
    {
        DropKinds {
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }
}

impl RetentionPolicy for DropKinds {
    fn retain(&self, object: &StateObject) -> bool {
        !self.kinds.contains(&object.kind)
    }
}

impl<F> RetentionPolicy for F
where
    F: Fn(&StateObject) -> bool,
{
    fn retain(&self, object: &StateObject) -> bool {
        self(object)
    }
}

/// Releases an exclusive claim when dropped.
struct ClaimGuard<'a> {
    ledger: &'a Ledger,
    claim: Exclusive,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.ledger.release(self.claim);
    }
}

impl LedgerState {
    fn boundary_mut(&mut self) -> Result<&mut Frame, LedgerError> {
        if !self.boundary_open {
            return Err(LedgerError::BoundarySealed(
                "boundary frame is frozen".to_string(),
            ));
        }
        let frame = self
            .frames
            .back_mut()
            .ok_or_else(|| LedgerError::CorruptLedger("ledger holds no frames".to_string()))?;
        if !frame.is_boundary() {
            return Err(LedgerError::BoundarySealed(format!(
                "tip {} is not a boundary frame",
                frame.id()
            )));
        }
        Ok(Arc::make_mut(frame))
    }
}

impl Ledger {
    /// Replace every frame from the origin through `through` with one boundary
    /// frame. Returns the boundary position (`through`).
    pub fn compact(
        &self,
        through: FrameId,
        retention: &dyn RetentionPolicy,
    ) -> Result<FrameId, LedgerError> {
        let me = thread::current().id();
        let claim = Exclusive::Compaction(me);
        self.acquire(claim)?;
        let _release = ClaimGuard {
            ledger: self,
            claim,
        };
        if self.session_active() {
            return Err(LedgerError::ConcurrentAppendInProgress);
        }

        let mut guard = self.write_state();
        let state = &mut *guard;
        state.check(through)?;
        if through == state.origin {
            debug!(through = through.position(), "Nothing to compact");
            return Ok(through);
        }

        let anchor = state.frame(through)?.link_digest();
        let mut objects = BTreeMap::new();
        let mut dropped = 0u64;
        for handle in state.index.handles() {
            match state.resolve(handle, through) {
                Ok(object) if retention.retain(&object) => {
                    objects.insert(handle, object);
                }
                Ok(_) => dropped += 1,
                Err(LedgerError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let retained: BTreeSet<Handle> = objects.keys().copied().collect();
        let archive = ArchiveDescriptor {
            compacted_from: state.origin,
            through,
            retained: retained.len() as u64,
            dropped,
            anchor: Some(anchor),
        };
        let boundary = Frame::seal(
            through,
            None,
            [0u8; 32],
            objects,
            FrameCause::Archive(archive.clone()),
        )?;

        let removed = (through.position() - state.origin.position() + 1) as usize;
        state.frames.drain(..removed);
        state.frames.push_front(Arc::new(boundary));
        state.index.compact(through, &retained);
        state.origin = through;
        state.boundary_open = through == state.tip();

        info!(
            from = archive.compacted_from.position(),
            through = through.position(),
            retained = archive.retained,
            dropped = archive.dropped,
            frames_removed = removed,
            "Ledger compacted"
        );
        Ok(through)
    }

    /// Take the amendment lock on the boundary at the tip.
    ///
    /// Fails with `BoundarySealed` once any frame has been appended after the
    /// boundary, or after a previous amendment has been released.
    pub fn amend_boundary(&self) -> Result<BoundaryAmendment, LedgerError> {
        let owner = thread::current().id();
        self.acquire(Exclusive::BoundaryAmendment(owner))?;
        let open = {
            let state = self.read_state();
            let tip_is_boundary = state.tip_frame().map(|f| f.is_boundary()).unwrap_or(false);
            state.boundary_open && tip_is_boundary
        };
        if !open {
            self.release(Exclusive::BoundaryAmendment(owner));
            return Err(LedgerError::BoundarySealed(format!(
                "boundary at {} is frozen",
                self.origin()
            )));
        }
        Ok(BoundaryAmendment {
            ledger: self.clone(),
            owner,
        })
    }
}

/// Exclusive, in-place edit of the boundary frame at the tip.
///
/// Dropping it (or calling `finish`) freezes the boundary for good.
pub struct BoundaryAmendment {
    ledger: Ledger,
    owner: ThreadId,
}

impl BoundaryAmendment {
    fn edit<T>(
        &self,
        f: impl FnOnce(&mut LedgerState, FrameId) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        if thread::current().id() != self.owner
            || !self.ledger.holds(Exclusive::BoundaryAmendment(self.owner))
        {
            return Err(LedgerError::ConcurrentAppendInProgress);
        }
        let mut guard = self.ledger.write_state();
        let state = &mut *guard;
        let at = state.tip();
        f(state, at)
    }

    /// Position of the boundary being amended.
    pub fn at(&self) -> FrameId {
        self.ledger.tip()
    }

    /// Add a new object to the boundary.
    pub fn create(&self, kind: ObjectKind, payload: Vec<u8>) -> Result<Handle, LedgerError> {
        self.edit(|state, at| {
            let handle = state.allocator.allocate();
            let frame = state.boundary_mut()?;
            frame
                .objects_mut()
                .insert(handle, Arc::new(StateObject::new(handle, at, kind, payload)));
            frame.reseal()?;
            state.index.record(handle, at);
            Ok(handle)
        })
    }

    /// Mutate an object held by the boundary.
    pub fn update<F>(&self, handle: Handle, f: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut StateObject),
    {
        self.edit(|state, at| {
            let frame = state.boundary_mut()?;
            let object = frame
                .objects_mut()
                .get_mut(&handle)
                .ok_or(LedgerError::NotFound { handle, at })?;
            f(Arc::make_mut(object));
            frame.reseal()?;
            Ok(())
        })
    }

    /// Remove an object from the boundary entirely.
    pub fn remove(&self, handle: Handle) -> Result<(), LedgerError> {
        self.edit(|state, at| {
            let frame = state.boundary_mut()?;
            if frame.objects_mut().remove(&handle).is_none() {
                return Err(LedgerError::NotFound { handle, at });
            }
            frame.reseal()?;
            state.index.forget(handle, at);
            Ok(())
        })
    }

    /// Freeze the boundary now.
    pub fn finish(self) {}
}

impl Drop for BoundaryAmendment {
    fn drop(&mut self) {
        let at = {
            let mut state = self.ledger.write_state();
            state.boundary_open = false;
            state.tip()
        };
        self.ledger.release(Exclusive::BoundaryAmendment(self.owner));
        debug!(boundary = at.position(), "Boundary frozen");
    }
}

fn default_max_retained_frames() -> u64 {
    4096
}

fn default_keep_recent() -> u64 {
    256
}

/// Automatic compaction settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_max_retained_frames")]
    pub max_retained_frames: u64,

    #[serde(default = "default_keep_recent")]
    pub keep_recent: u64,

    #[serde(default)]
    pub drop_kinds: Vec<String>,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        CompactionConfig {
            enabled: false,
            max_retained_frames: default_max_retained_frames(),
            keep_recent: default_keep_recent(),
            drop_kinds: Vec::new(),
        }
    }
}

/// Applies a compaction policy once the ledger grows past a threshold.
pub struct Compactor {
    config: CompactionConfig,
    retention: Box<dyn RetentionPolicy + Send + Sync>,
}

impl Compactor {
    pub fn from_config(config: CompactionConfig) -> Self {
        let retention: Box<dyn RetentionPolicy + Send + Sync> = if config.drop_kinds.is_empty() {
            Box::new(RetainAll)
        } else {
            Box::new(DropKinds::new(config.drop_kinds.iter().cloned()))
        };
        Compactor { config, retention }
    }

    pub fn with_retention(
        mut self,
        retention: impl RetentionPolicy + Send + Sync + 'static,
    ) -> Self {
        self.retention = Box::new(retention);
        self
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Compact through `tip - keep_recent` when more than
    /// `max_retained_frames` frames are retained.
    pub fn maybe_compact(&self, ledger: &Ledger) -> Result<Option<FrameId>, LedgerError> {
        if !self.config.enabled {
            return Ok(None);
        }
        let origin = ledger.origin();
        let tip = ledger.tip();
        let retained = tip.position() - origin.position() + 1;
        if retained <= self.config.max_retained_frames {
            return Ok(None);
        }
        let through = FrameId::new(tip.position().saturating_sub(self.config.keep_recent));
        if through <= origin {
            return Ok(None);
        }
        ledger.compact(through, self.retention.as_ref()).map(Some)
    }
}
