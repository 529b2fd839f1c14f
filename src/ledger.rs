//! Ledger
//!
//! The ordered, append-only sequence of frames plus the handle index. A
//! `Ledger` is a cheap, cloneable handle onto shared state: committed frames sit
//! behind a read-write lock that builders only take for the instant of
//! publication, so readers never wait on an in-flight build and never observe
//! a builder's private working set.
//!
//! Frames committed inside a submission are pending until the top-level
//! submission finishes: the submitting thread reads them, every other thread
//! reads the settled prefix. A failed submission rolls its pending frames
//! back, so a published frame is never retracted or rewritten.

use crate::concurrency::{Exclusive, WriterSlot};
use crate::error::LedgerError;
use crate::frame::{Frame, FrameBuilder, FrameCause};
use crate::heads::HeadIndex;
use crate::object::StateObject;
use crate::transaction::{InterruptionPhase, TransactionDescriptor};
use crate::types::{FrameId, Handle, HandleAllocator, Hash};
use crate::view::View;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, error};

/// Committed ledger state
pub(crate) struct LedgerState {
    /// Retained frames; `frames[0]` sits at `origin` and is always a boundary.
    pub(crate) frames: VecDeque<Arc<Frame>>,
    pub(crate) origin: FrameId,
    pub(crate) index: HeadIndex,
    pub(crate) allocator: HandleAllocator,
    /// Whether the boundary at the tip may still be amended.
    pub(crate) boundary_open: bool,
    /// Last position visible to every thread.
    pub(crate) settled: FrameId,
    /// Submitting thread that owns the frames above `settled`.
    pub(crate) pending_owner: Option<ThreadId>,
}

impl LedgerState {
    pub(crate) fn tip(&self) -> FrameId {
        let retained = self.frames.len().saturating_sub(1) as u64;
        FrameId::new(self.origin.position() + retained)
    }

    /// The tip as the calling thread may see it.
    pub(crate) fn visible_tip(&self) -> FrameId {
        match self.pending_owner {
            Some(owner) if owner != thread::current().id() => self.settled,
            _ => self.tip(),
        }
    }

    pub(crate) fn check(&self, at: FrameId) -> Result<(), LedgerError> {
        if at < self.origin {
            return Err(LedgerError::Compacted {
                at,
                origin: self.origin,
            });
        }
        if at > self.visible_tip() {
            return Err(LedgerError::FrameNotFound(at));
        }
        Ok(())
    }

    pub(crate) fn frame(&self, at: FrameId) -> Result<&Arc<Frame>, LedgerError> {
        self.check(at)?;
        let offset = (at.position() - self.origin.position()) as usize;
        self.frames.get(offset).ok_or(LedgerError::FrameNotFound(at))
    }

    pub(crate) fn tip_frame(&self) -> Result<&Arc<Frame>, LedgerError> {
        self.frames
            .back()
            .ok_or_else(|| LedgerError::CorruptLedger("ledger holds no frames".to_string()))
    }

    /// The version of `handle` visible at `at`.
    pub(crate) fn resolve(
        &self,
        handle: Handle,
        at: FrameId,
    ) -> Result<Arc<StateObject>, LedgerError> {
        self.check(at)?;
        let head = self
            .index
            .head_at(handle, at)
            .ok_or(LedgerError::NotFound { handle, at })?;
        let object = self.frame(head)?.object(handle).cloned().ok_or_else(|| {
            LedgerError::CorruptLedger(format!(
                "index points {} at {} but the frame lacks it",
                handle, head
            ))
        })?;
        if object.is_destroyed() {
            return Err(LedgerError::NotFound { handle, at });
        }
        Ok(object)
    }
}

struct LedgerInner {
    state: RwLock<LedgerState>,
    slot: Mutex<WriterSlot>,
    published: AtomicU64,
}

/// Shared handle onto a ledger
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Ledger")
            .field("origin", &state.origin)
            .field("tip", &state.tip())
            .field("handles", &state.index.len())
            .finish()
    }
}

impl Ledger {
    /// An empty ledger holding only the genesis boundary.
    ///
    /// The genesis boundary stays open for amendment until the first frame is
    /// appended, which is how initial world state is seeded.
    pub fn new() -> Result<Self, LedgerError> {
        let mut frames = VecDeque::new();
        frames.push_back(Arc::new(Frame::genesis()?));
        Ok(Self::from_state(LedgerState {
            frames,
            origin: FrameId::GENESIS,
            index: HeadIndex::new(),
            allocator: HandleAllocator::new(),
            boundary_open: true,
            settled: FrameId::GENESIS,
            pending_owner: None,
        }))
    }

    /// Reassemble a ledger from validated frames (used by persistence).
    pub(crate) fn from_frames(
        frames: VecDeque<Arc<Frame>>,
        allocator: HandleAllocator,
    ) -> Result<Self, LedgerError> {
        let origin = frames
            .front()
            .map(|f| f.id())
            .ok_or_else(|| LedgerError::CorruptLedger("no frames to load".to_string()))?;
        let mut index = HeadIndex::new();
        for frame in &frames {
            for handle in frame.objects().keys() {
                index.record(*handle, frame.id());
            }
        }
        let settled = FrameId::new(origin.position() + frames.len() as u64 - 1);
        Ok(Self::from_state(LedgerState {
            frames,
            origin,
            index,
            allocator,
            boundary_open: false,
            settled,
            pending_owner: None,
        }))
    }

    fn from_state(state: LedgerState) -> Self {
        let tip = state.tip();
        Ledger {
            inner: Arc::new(LedgerInner {
                state: RwLock::new(state),
                slot: Mutex::new(WriterSlot::new()),
                published: AtomicU64::new(tip.position()),
            }),
        }
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.inner.state.read()
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.inner.state.write()
    }

    pub(crate) fn acquire(&self, claim: Exclusive) -> Result<(), LedgerError> {
        let result = self.inner.slot.lock().acquire(claim);
        if let Err(e) = &result {
            error!(error = %e, "Rejected exclusive ledger access");
        }
        result
    }

    pub(crate) fn release(&self, claim: Exclusive) {
        self.inner.slot.lock().release(claim);
    }

    pub(crate) fn holds(&self, claim: Exclusive) -> bool {
        self.inner.slot.lock().holds(claim)
    }

    pub(crate) fn session_active(&self) -> bool {
        self.inner.slot.lock().session_owner().is_some()
    }

    /// Never moves backwards.
    pub(crate) fn mark_published(&self, tip: FrameId) {
        self.inner
            .published
            .fetch_max(tip.position(), Ordering::AcqRel);
    }

    pub(crate) fn allocate_handle(&self) -> Handle {
        self.inner.state.write().allocator.allocate()
    }

    /// Make sure the next allocation is at least `next`. Used by replay to
    /// skip handles a discarded builder burned in the recorded run.
    pub(crate) fn reserve_handles_from(&self, next: u64) {
        let mut state = self.write_state();
        let watermark = state.allocator.watermark().max(next);
        state.allocator = HandleAllocator::resume_at(watermark);
    }

    /// Current last committed position.
    ///
    /// Inside a submission the submitting thread sees its pending frames;
    /// other threads see the last settled position.
    pub fn tip(&self) -> FrameId {
        self.read_state().visible_tip()
    }

    /// First retained position (the current boundary).
    pub fn origin(&self) -> FrameId {
        self.read_state().origin
    }

    /// Last published position, read without taking any lock.
    ///
    /// This is the only signal a thread that does not own the writer should
    /// poll to learn that a new tip exists.
    pub fn published_tip(&self) -> FrameId {
        FrameId::new(self.inner.published.load(Ordering::Acquire))
    }

    /// The value the next handle allocation will use.
    pub fn next_handle_watermark(&self) -> u64 {
        self.read_state().allocator.watermark()
    }

    /// Whether a builder, boundary amendment, compaction or submission is in
    /// flight.
    pub fn is_build_in_progress(&self) -> bool {
        self.inner.slot.lock().in_progress()
    }

    /// The version of `handle` visible at or before `at`.
    pub fn get(&self, handle: Handle, at: FrameId) -> Result<Arc<StateObject>, LedgerError> {
        self.read_state().resolve(handle, at)
    }

    /// `get(handle, tip)`.
    pub fn latest(&self, handle: Handle) -> Result<Arc<StateObject>, LedgerError> {
        let state = self.read_state();
        let tip = state.visible_tip();
        state.resolve(handle, tip)
    }

    /// The cause recorded for the frame at `at`.
    pub fn descriptor(&self, at: FrameId) -> Result<FrameCause, LedgerError> {
        Ok(self.read_state().frame(at)?.cause().clone())
    }

    /// The full committed frame at `at`.
    pub fn frame(&self, at: FrameId) -> Result<Arc<Frame>, LedgerError> {
        Ok(Arc::clone(self.read_state().frame(at)?))
    }

    pub fn digest(&self, at: FrameId) -> Result<Hash, LedgerError> {
        Ok(*self.read_state().frame(at)?.digest())
    }

    /// Handles with a live (not destroyed) version at `at`, in handle order.
    pub fn live_handles(&self, at: FrameId) -> Result<Vec<Handle>, LedgerError> {
        let state = self.read_state();
        state.check(at)?;
        Ok(state
            .index
            .handles()
            .into_iter()
            .filter(|h| state.resolve(*h, at).is_ok())
            .collect())
    }

    /// Committed frames strictly after `after`, oldest first.
    pub fn frames_since(&self, after: FrameId) -> Result<Vec<Arc<Frame>>, LedgerError> {
        let state = self.read_state();
        if after.next() < state.origin {
            return Err(LedgerError::Compacted {
                at: after,
                origin: state.origin,
            });
        }
        let skip = (after.next().position() - state.origin.position()) as usize;
        let visible = (state.visible_tip().position() - state.origin.position() + 1) as usize;
        Ok(state
            .frames
            .iter()
            .take(visible)
            .skip(skip)
            .cloned()
            .collect())
    }

    /// Reader pinned to `at`.
    pub fn view(&self, at: FrameId) -> Result<View, LedgerError> {
        self.read_state().check(at)?;
        Ok(View::new(self.clone(), at))
    }

    /// Reader pinned to the current tip.
    pub fn view_tip(&self) -> View {
        View::new(self.clone(), self.tip())
    }

    /// Open the frame builder on top of `parent`, which must be the tip.
    pub fn open_builder(&self, parent: FrameId) -> Result<FrameBuilder, LedgerError> {
        FrameBuilder::open(self, parent)
    }

    /// Commit `builder` as the next frame.
    pub fn append(
        &self,
        builder: FrameBuilder,
        descriptor: TransactionDescriptor,
        phase: InterruptionPhase,
    ) -> Result<FrameId, LedgerError> {
        builder.commit(descriptor, phase)
    }

    /// Start (or re-enter, on the owning thread) a top-level submission.
    ///
    /// While the guard lives, other threads cannot open builders or append.
    pub fn begin_submission(&self) -> Result<SubmissionGuard, LedgerError> {
        let me = thread::current().id();
        let depth = self.inner.slot.lock().enter_session(me);
        match depth {
            Ok(depth) => {
                debug!(depth, "Submission entered");
                Ok(SubmissionGuard {
                    ledger: self.clone(),
                    owner: me,
                    depth,
                })
            }
            Err(e) => {
                error!(error = %e, "Rejected submission from a second thread");
                Err(e)
            }
        }
    }

    /// Publish a builder's working set as the next frame.
    pub(crate) fn publish(
        &self,
        parent: FrameId,
        owner: ThreadId,
        working: BTreeMap<Handle, StateObject>,
        cause: FrameCause,
    ) -> Result<FrameId, LedgerError> {
        let me = thread::current().id();
        if me != owner {
            error!(parent = %parent, "Builder committed from a thread that did not open it");
            return Err(LedgerError::ConcurrentAppendInProgress);
        }
        let in_session = {
            let slot = self.inner.slot.lock();
            slot.may_publish(me)?;
            slot.session_owner() == Some(me)
        };

        let mut state = self.write_state();
        let tip_frame = Arc::clone(state.tip_frame()?);
        let tip = tip_frame.id();
        if parent != tip {
            return Err(LedgerError::StaleProposal(format!(
                "builder opened at {} but the tip is {}",
                parent, tip
            )));
        }

        let id = tip.next();
        let objects = working
            .into_iter()
            .map(|(handle, object)| (handle, Arc::new(object)))
            .collect();
        let frame = Frame::seal(id, Some(tip), tip_frame.link_digest(), objects, cause)?;
        let changed = frame.objects().len();
        for handle in frame.objects().keys() {
            state.index.record(*handle, id);
        }
        let phase = frame.cause().phase().map(|p| p.as_str()).unwrap_or("archive");
        state.frames.push_back(Arc::new(frame));
        state.boundary_open = false;
        if in_session {
            state.pending_owner = Some(me);
        } else {
            state.settled = id;
        }
        drop(state);

        if !in_session {
            self.mark_published(id);
        }
        debug!(frame = id.position(), changed, phase, pending = in_session, "Frame committed");
        Ok(id)
    }

    /// Drop every pending frame above `to`.
    ///
    /// Only the submitting thread may do this, and never below the settled
    /// position. Handles allocated by the dropped frames stay burned.
    pub(crate) fn rollback_to(&self, to: FrameId) -> Result<usize, LedgerError> {
        let me = thread::current().id();
        if self.inner.slot.lock().session_owner() != Some(me) {
            error!(frame = %to, "Rollback outside the owning submission");
            return Err(LedgerError::ConcurrentAppendInProgress);
        }

        let mut state = self.write_state();
        if to < state.settled || to < state.origin {
            return Err(LedgerError::Rule(format!(
                "cannot roll back to {}: frames through {} are published",
                to, state.settled
            )));
        }
        let keep = (to.position() - state.origin.position() + 1) as usize;
        let dropped = state.frames.len().saturating_sub(keep);
        state.frames.truncate(keep);
        state.index.truncate_after(to);
        debug!(tip = to.position(), dropped, "Pending frames rolled back");
        Ok(dropped)
    }

    /// Publish every pending frame owned by `owner`.
    fn settle(&self, owner: ThreadId) {
        let tip = {
            let mut state = self.write_state();
            if state.pending_owner != Some(owner) {
                return;
            }
            state.pending_owner = None;
            state.settled = state.tip();
            state.settled
        };
        self.mark_published(tip);
        debug!(tip = tip.position(), "Submission settled");
    }
}

/// RAII guard for an in-flight submission
pub struct SubmissionGuard {
    ledger: Ledger,
    owner: ThreadId,
    depth: usize,
}

impl SubmissionGuard {
    /// Nesting depth: 1 for a top-level submission, more for reactions.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        // The session is still held here, so no other thread can publish.
        if self.depth == 1 {
            self.ledger.settle(self.owner);
        }
        self.ledger.inner.slot.lock().leave_session(self.owner);
    }
}
