//! Read-only reader pinned to one frame position.

use crate::error::LedgerError;
use crate::frame::{Frame, FrameCause};
use crate::ledger::Ledger;
use crate::object::StateObject;
use crate::types::{FrameId, Handle};
use std::sync::Arc;

/// Snapshot reader. Cheap to clone; never observes later commits.
#[derive(Debug, Clone)]
pub struct View {
    ledger: Ledger,
    at: FrameId,
}

impl View {
    pub(crate) fn new(ledger: Ledger, at: FrameId) -> Self {
        View { ledger, at }
    }

    pub fn at(&self) -> FrameId {
        self.at
    }

    pub fn get(&self, handle: Handle) -> Result<Arc<StateObject>, LedgerError> {
        self.ledger.get(handle, self.at)
    }

    /// Decode the payload of `handle` as `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self, handle: Handle) -> Result<T, LedgerError> {
        Ok(self.get(handle)?.decode()?)
    }

    pub fn exists(&self, handle: Handle) -> bool {
        self.get(handle).is_ok()
    }

    pub fn descriptor(&self) -> Result<FrameCause, LedgerError> {
        self.ledger.descriptor(self.at)
    }

    pub fn frame(&self) -> Result<Arc<Frame>, LedgerError> {
        self.ledger.frame(self.at)
    }

    pub fn live_handles(&self) -> Result<Vec<Handle>, LedgerError> {
        self.ledger.live_handles(self.at)
    }
}
