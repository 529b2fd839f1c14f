//! Frame Builder
//!
//! Scoped, exclusive staging area for the next frame. Objects are cloned into a
//! private working set the first time they are staged (copy-on-write), so a
//! frame stores only what changed. The builder is an RAII guard on the
//! ledger's writer slot: dropping it without committing discards it.

use crate::concurrency::Exclusive;
use crate::error::LedgerError;
use crate::frame::FrameCause;
use crate::ledger::Ledger;
use crate::object::{ObjectKind, StateObject};
use crate::transaction::{InterruptionPhase, TransactionDescriptor};
use crate::types::{FrameId, Handle};
use std::collections::BTreeMap;
use std::thread::{self, ThreadId};
use tracing::debug;

/// Mutable staging area for one frame
pub struct FrameBuilder {
    ledger: Ledger,
    parent: FrameId,
    owner: ThreadId,
    working: BTreeMap<Handle, StateObject>,
    committed: bool,
}

impl FrameBuilder {
    pub(crate) fn open(ledger: &Ledger, parent: FrameId) -> Result<Self, LedgerError> {
        let owner = thread::current().id();
        ledger.acquire(Exclusive::Builder(owner))?;

        // From here on, Drop releases the slot.
        let builder = FrameBuilder {
            ledger: ledger.clone(),
            parent,
            owner,
            working: BTreeMap::new(),
            committed: false,
        };

        let tip = ledger.tip();
        if parent != tip {
            return Err(LedgerError::StaleProposal(format!(
                "cannot build on {}: the tip is {}",
                parent, tip
            )));
        }
        debug!(parent = parent.position(), "Frame builder opened");
        Ok(builder)
    }

    /// Position this builder reads from.
    pub fn parent(&self) -> FrameId {
        self.parent
    }

    /// Mutable access to `handle`, cloning its parent-visible version into
    /// the working set on first request.
    pub fn stage(&mut self, handle: Handle) -> Result<&mut StateObject, LedgerError> {
        if !self.working.contains_key(&handle) {
            let current = self.ledger.get(handle, self.parent)?;
            self.working.insert(handle, StateObject::clone(&current));
        }
        match self.working.get_mut(&handle) {
            Some(object) if !object.is_destroyed() => Ok(object),
            _ => Err(LedgerError::NotFound {
                handle,
                at: self.parent,
            }),
        }
    }

    /// Read `handle` as this builder currently sees it, without staging.
    pub fn read(&self, handle: Handle) -> Result<StateObject, LedgerError> {
        match self.working.get(&handle) {
            Some(object) if object.is_destroyed() => Err(LedgerError::NotFound {
                handle,
                at: self.parent,
            }),
            Some(object) => Ok(object.clone()),
            None => {
                let current = self.ledger.get(handle, self.parent)?;
                Ok(StateObject::clone(&current))
            }
        }
    }

    /// Create a new object born in the frame being built.
    pub fn create(&mut self, kind: ObjectKind, payload: Vec<u8>) -> Result<Handle, LedgerError> {
        let handle = self.ledger.allocate_handle();
        let born = self.parent.next();
        self.working
            .insert(handle, StateObject::new(handle, born, kind, payload));
        Ok(handle)
    }

    /// Stage the destruction of `handle`.
    pub fn destroy(&mut self, handle: Handle) -> Result<(), LedgerError> {
        self.stage(handle)?.mark_destroyed();
        Ok(())
    }

    /// Handles staged so far, in handle order.
    pub fn staged_handles(&self) -> Vec<Handle> {
        self.working.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    /// Finalize into an immutable frame and append it to the ledger.
    ///
    /// `Interrupt` frames are trial steps and must not change any object.
    pub fn commit(
        mut self,
        mut descriptor: TransactionDescriptor,
        phase: InterruptionPhase,
    ) -> Result<FrameId, LedgerError> {
        if phase == InterruptionPhase::Interrupt && !self.working.is_empty() {
            return Err(LedgerError::Rule(format!(
                "interrupt frame for '{}' must not change objects ({} staged)",
                descriptor.action(),
                self.working.len()
            )));
        }
        descriptor.phase = phase;
        let working = std::mem::take(&mut self.working);
        let id = self.ledger.publish(
            self.parent,
            self.owner,
            working,
            FrameCause::Transaction(descriptor),
        )?;
        self.committed = true;
        Ok(id)
    }

    /// Abandon every staged clone. The ledger is left untouched.
    pub fn discard(self) {
        // Drop does the work.
    }
}

impl Drop for FrameBuilder {
    fn drop(&mut self) {
        if !self.committed {
            debug!(
                parent = self.parent.position(),
                staged = self.working.len(),
                "Frame builder discarded"
            );
        }
        self.ledger.release(Exclusive::Builder(self.owner));
    }
}
