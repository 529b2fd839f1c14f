//! Writer slot
//!
//! Single-writer / multi-reader discipline for the ledger. The slot records
//! which thread holds the open builder (or boundary amendment lock) and which
//! thread owns the in-flight submission. Conflicts fail fast; nothing queues.
//!
//! Reaction chains re-enter the submission on the owning thread, so the
//! session carries a depth counter instead of a plain flag.

use crate::error::LedgerError;
use std::thread::ThreadId;

/// What currently holds the exclusive builder position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exclusive {
    Builder(ThreadId),
    BoundaryAmendment(ThreadId),
    Compaction(ThreadId),
}

impl Exclusive {
    fn owner(self) -> ThreadId {
        match self {
            Exclusive::Builder(t) | Exclusive::BoundaryAmendment(t) | Exclusive::Compaction(t) => t,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Session {
    owner: ThreadId,
    depth: usize,
}

/// Ledger-owned build-in-progress state
#[derive(Debug, Default)]
pub(crate) struct WriterSlot {
    exclusive: Option<Exclusive>,
    session: Option<Session>,
}

impl WriterSlot {
    pub(crate) fn new() -> Self {
        WriterSlot::default()
    }

    fn check_session(&self, me: ThreadId) -> Result<(), LedgerError> {
        match self.session {
            Some(s) if s.owner != me => Err(LedgerError::ConcurrentAppendInProgress),
            _ => Ok(()),
        }
    }

    /// Claim the exclusive position. At most one builder exists at a time,
    /// whichever thread asks.
    pub(crate) fn acquire(&mut self, claim: Exclusive) -> Result<(), LedgerError> {
        if self.exclusive.is_some() {
            return Err(LedgerError::BuilderAlreadyOpen);
        }
        self.check_session(claim.owner())?;
        self.exclusive = Some(claim);
        Ok(())
    }

    pub(crate) fn release(&mut self, claim: Exclusive) {
        if self.exclusive == Some(claim) {
            self.exclusive = None;
        }
    }

    pub(crate) fn holds(&self, claim: Exclusive) -> bool {
        self.exclusive == Some(claim)
    }

    /// Enter (or re-enter) a submission on `me`.
    pub(crate) fn enter_session(&mut self, me: ThreadId) -> Result<usize, LedgerError> {
        self.check_session(me)?;
        if let Some(ex) = self.exclusive {
            if ex.owner() != me {
                return Err(LedgerError::ConcurrentAppendInProgress);
            }
        }
        let depth = self.session.map_or(0, |s| s.depth) + 1;
        self.session = Some(Session { owner: me, depth });
        Ok(depth)
    }

    pub(crate) fn leave_session(&mut self, me: ThreadId) {
        if let Some(s) = self.session {
            if s.owner != me {
                return;
            }
            self.session = if s.depth > 1 {
                Some(Session {
                    owner: me,
                    depth: s.depth - 1,
                })
            } else {
                None
            };
        }
    }

    /// Whether `me` may publish a frame right now.
    pub(crate) fn may_publish(&self, me: ThreadId) -> Result<(), LedgerError> {
        self.check_session(me)?;
        match self.exclusive {
            Some(Exclusive::Builder(owner)) if owner == me => Ok(()),
            _ => Err(LedgerError::ConcurrentAppendInProgress),
        }
    }

    pub(crate) fn session_owner(&self) -> Option<ThreadId> {
        self.session.map(|s| s.owner)
    }

    pub(crate) fn session_depth(&self) -> usize {
        self.session.map_or(0, |s| s.depth)
    }

    pub(crate) fn in_progress(&self) -> bool {
        self.exclusive.is_some() || self.session.is_some()
    }
}
