//! Descriptor lifecycle state machine
//!
//! ```text
//! Proposed ──────────────────────────────► Committed      (phase None)
//!    │                                        ▲
//!    └──► Interrupt ──► Discarded ────────────┤           (phase None)
//!             │                               │
//!             ├───────► Resume ───────────────┘           (phase Resume)
//!             └───────► Fizzled                           (resume no longer legal)
//! ```

use crate::error::LedgerError;
use crate::transaction::InterruptionPhase;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a submitted descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorState {
    Proposed,
    Interrupt,
    Discarded,
    Resume,
    Committed,
    Fizzled,
}

impl DescriptorState {
    fn can_reach(self, to: DescriptorState) -> bool {
        use DescriptorState::*;
        matches!(
            (self, to),
            (Proposed, Interrupt)
                | (Proposed, Committed)
                | (Interrupt, Discarded)
                | (Interrupt, Resume)
                | (Interrupt, Fizzled)
                | (Discarded, Committed)
                | (Resume, Committed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DescriptorState::Committed | DescriptorState::Fizzled)
    }
}

/// Tracks one descriptor through its lifecycle.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: DescriptorState,
    trail: Vec<DescriptorState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Lifecycle {
            state: DescriptorState::Proposed,
            trail: vec![DescriptorState::Proposed],
        }
    }

    pub fn state(&self) -> DescriptorState {
        self.state
    }

    /// Every state visited, in order.
    pub fn trail(&self) -> &[DescriptorState] {
        &self.trail
    }

    pub fn advance(&mut self, to: DescriptorState) -> Result<(), LedgerError> {
        if !self.state.can_reach(to) {
            return Err(LedgerError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.trail.push(to);
        Ok(())
    }

    /// Phase the next commit must carry, given the current state.
    pub fn commit_phase(&self) -> Result<InterruptionPhase, LedgerError> {
        match self.state {
            DescriptorState::Proposed | DescriptorState::Discarded => Ok(InterruptionPhase::None),
            DescriptorState::Resume => Ok(InterruptionPhase::Resume),
            other => Err(LedgerError::InvalidTransition {
                from: other,
                to: DescriptorState::Committed,
            }),
        }
    }
}
