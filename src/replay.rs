//! Replay
//!
//! Re-applies a ledger's recorded descriptors, in order, to a fresh ledger
//! seeded from the source's origin boundary, and checks that every frame
//! digest matches. `Recorded` mode serves outcomes from each descriptor's
//! output section; `Recompute` mode draws them again from the seeded stream,
//! which is what a peer does with relayed inputs.

use crate::error::LedgerError;
use crate::frame::FrameCause;
use crate::ledger::Ledger;
use crate::transaction::outcome::{outcome_seed, OutcomeRecorder};
use crate::transaction::{InterruptionPhase, RuleSet, TransactionDescriptor};
use crate::types::{FrameId, HandleAllocator};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    /// Serve recorded outcomes back to the rules.
    Recorded,
    /// Recompute outcomes and require them to match the recording.
    Recompute,
}

pub struct Replayer<'a, R> {
    rules: &'a R,
    seed: u64,
    mode: ReplayMode,
}

impl<'a, R: RuleSet> Replayer<'a, R> {
    pub fn new(rules: &'a R, seed: u64) -> Self {
        Replayer {
            rules,
            seed,
            mode: ReplayMode::Recorded,
        }
    }

    pub fn with_mode(mut self, mode: ReplayMode) -> Self {
        self.mode = mode;
        self
    }

    /// Rebuild `source` from its origin boundary and recorded descriptors.
    ///
    /// Fails with `ReplayDivergence` at the first frame whose digest differs.
    pub fn replay(&self, source: &Ledger) -> Result<Ledger, LedgerError> {
        let origin = source.frame(source.origin())?;
        let next_handle = origin
            .objects()
            .keys()
            .map(|h| h.raw() + 1)
            .max()
            .unwrap_or(1);
        let replica = Ledger::from_frames(
            VecDeque::from([Arc::clone(&origin)]),
            HandleAllocator::resume_at(next_handle),
        )?;

        for frame in source.frames_since(origin.id())? {
            let at = frame.id();
            let descriptor = match frame.cause() {
                FrameCause::Transaction(d) => d,
                FrameCause::Archive(_) => {
                    return Err(LedgerError::CorruptLedger(format!(
                        "boundary frame at {} follows the origin",
                        at
                    )))
                }
            };

            if let Some(first_born) = frame
                .objects()
                .values()
                .filter(|o| o.born() == at)
                .map(|o| o.handle().raw())
                .min()
            {
                replica.reserve_handles_from(first_born);
            }

            let id = self
                .apply(&replica, descriptor)
                .map_err(|e| LedgerError::ReplayDivergence {
                    at,
                    reason: e.to_string(),
                })?;
            if id != at {
                return Err(LedgerError::ReplayDivergence {
                    at,
                    reason: format!("replayed frame landed at {}", id),
                });
            }

            if replica.digest(id)? != *frame.digest() {
                let replayed = replica.descriptor(id)?;
                let reason = match replayed.as_transaction() {
                    Some(d) if d.output != descriptor.output => "recomputed outcomes differ",
                    _ => "frame digest differs",
                };
                return Err(LedgerError::ReplayDivergence {
                    at,
                    reason: reason.to_string(),
                });
            }
            debug!(frame = at.position(), action = descriptor.action(), "Frame replayed");
        }
        Ok(replica)
    }

    /// Replay `source` and report the verified tip.
    pub fn verify(&self, source: &Ledger) -> Result<FrameId, LedgerError> {
        let replica = self.replay(source)?;
        let tip = replica.tip();
        info!(
            origin = source.origin().position(),
            tip = tip.position(),
            mode = ?self.mode,
            "Replay verified"
        );
        Ok(tip)
    }

    fn apply(
        &self,
        replica: &Ledger,
        recorded: &TransactionDescriptor,
    ) -> Result<FrameId, LedgerError> {
        let parent = replica.tip();
        let input = &recorded.input;
        let mut builder = replica.open_builder(parent)?;
        if recorded.phase == InterruptionPhase::Interrupt {
            return builder.commit(TransactionDescriptor::new(input.clone()), recorded.phase);
        }

        let seed = outcome_seed(self.seed, parent, input)?;
        let mut outcomes = match self.mode {
            ReplayMode::Recorded => OutcomeRecorder::replaying(seed, recorded.output.clone()),
            ReplayMode::Recompute => OutcomeRecorder::recording(seed),
        };
        self.rules.apply(&mut builder, input, &mut outcomes)?;
        let output = outcomes.finish()?;
        builder.commit(
            TransactionDescriptor::new(input.clone()).with_output(output),
            recorded.phase,
        )
    }
}
