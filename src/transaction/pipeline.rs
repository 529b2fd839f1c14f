//! Submission pipeline
//!
//! Drives one descriptor through its lifecycle against a `RuleSet` and an
//! ordered list of `Reactor`s:
//!
//! 1. Validate the input against the tip.
//! 2. Stage a provisional `Interrupt` frame (no object changes) in an open
//!    builder and show the action to each reactor, in order.
//! 3. The first reaction that validates commits the interrupt frame; every
//!    reaction then runs through this same pipeline, recursively, on this
//!    thread.
//! 4. No reaction: discard the interrupt builder and commit one `None` frame.
//!    Reaction: re-validate against the advanced tip and commit `Resume`, or
//!    fizzle if the action is no longer legal.
//!
//! A submission that fails rolls back every frame it committed. Nothing it
//! commits is visible to other threads until the top-level submission ends.

use crate::config::LedgerSettings;
use crate::error::LedgerError;
use crate::frame::FrameBuilder;
use crate::ledger::Ledger;
use crate::transaction::lifecycle::{DescriptorState, Lifecycle};
use crate::transaction::outcome::{outcome_seed, OutcomeRecorder};
use crate::transaction::{DescriptorInput, InterruptionPhase, TransactionDescriptor};
use crate::types::FrameId;
use crate::view::View;
use tracing::{debug, warn};

/// Rule layer: decides whether an action is legal and what it changes.
pub trait RuleSet {
    /// Check `input` against the state visible in `view`.
    fn validate(&self, view: &View, input: &DescriptorInput) -> Result<(), String>;

    /// Stage the effects of `input`. Random results must be drawn through
    /// `outcomes` so they are recorded for replay.
    fn apply(
        &self,
        builder: &mut FrameBuilder,
        input: &DescriptorInput,
        outcomes: &mut OutcomeRecorder,
    ) -> Result<(), LedgerError>;

    /// Whether reactors get to respond before `input` takes effect.
    fn interruptible(&self, _input: &DescriptorInput) -> bool {
        true
    }
}

/// Observes an interrupt frame and proposes follow-up descriptors.
///
/// Must be deterministic: the same view and descriptor yield the same
/// reactions in the same order.
pub trait Reactor {
    fn react(&self, view: &View, descriptor: &TransactionDescriptor) -> Vec<DescriptorInput>;
}

impl<F> Reactor for F
where
    F: Fn(&View, &TransactionDescriptor) -> Vec<DescriptorInput>,
{
    fn react(&self, view: &View, descriptor: &TransactionDescriptor) -> Vec<DescriptorInput> {
        self(view, descriptor)
    }
}

/// What a submission did to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReport {
    /// Every frame that remains committed because of this submission,
    /// including reaction frames, in commit order.
    pub frames: Vec<FrameId>,
    /// The `None` or `Resume` frame carrying the final effects.
    pub final_frame: Option<FrameId>,
    pub state: DescriptorState,
    pub trail: Vec<DescriptorState>,
    /// Why the resume was abandoned, for fizzled actions.
    pub stale_reason: Option<String>,
}

impl SubmitReport {
    pub fn committed(&self) -> bool {
        self.state == DescriptorState::Committed
    }

    pub fn fizzled(&self) -> bool {
        self.state == DescriptorState::Fizzled
    }
}

pub struct Pipeline<R> {
    ledger: Ledger,
    rules: R,
    reactors: Vec<Box<dyn Reactor + Send + Sync>>,
    max_depth: usize,
    seed: u64,
}

impl<R: RuleSet> Pipeline<R> {
    pub fn new(ledger: Ledger, rules: R) -> Self {
        let defaults = LedgerSettings::default();
        Pipeline {
            ledger,
            rules,
            reactors: Vec::new(),
            max_depth: defaults.max_reaction_depth,
            seed: defaults.seed,
        }
    }

    /// Append a reactor. Reactors are consulted in the order they were added.
    pub fn with_reactor(mut self, reactor: impl Reactor + Send + Sync + 'static) -> Self {
        self.reactors.push(Box::new(reactor));
        self
    }

    pub fn with_settings(mut self, settings: &LedgerSettings) -> Self {
        self.max_depth = settings.max_reaction_depth;
        self.seed = settings.seed;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Submit a descriptor input and run its full lifecycle.
    ///
    /// A proposal that fails validation against the tip returns
    /// `StaleProposal` and leaves the ledger untouched. Any other failure
    /// rolls the tip back to where this submission started.
    pub fn submit(&self, input: DescriptorInput) -> Result<SubmitReport, LedgerError> {
        let session = self.ledger.begin_submission()?;
        let depth = session.depth() - 1;
        if depth > self.max_depth {
            warn!(depth, max = self.max_depth, action = %input.action, "Reaction chain too deep");
            return Err(LedgerError::ReactionDepthExceeded(self.max_depth));
        }

        let start = self.ledger.tip();
        let result = self.run(input);
        if let Err(e) = &result {
            if self.ledger.tip() != start {
                let dropped = self.ledger.rollback_to(start)?;
                warn!(
                    error = %e,
                    tip = start.position(),
                    dropped,
                    "Submission failed, frames rolled back"
                );
            }
        }
        drop(session);
        result
    }

    fn run(&self, input: DescriptorInput) -> Result<SubmitReport, LedgerError> {
        let mut lifecycle = Lifecycle::new();
        if let Err(reason) = self.rules.validate(&self.ledger.view_tip(), &input) {
            debug!(action = %input.action, %reason, "Proposal rejected");
            return Err(LedgerError::StaleProposal(reason));
        }

        if self.reactors.is_empty() || !self.rules.interruptible(&input) {
            let id = self.commit_effects(&input, lifecycle.commit_phase()?)?;
            lifecycle.advance(DescriptorState::Committed)?;
            return Ok(report(vec![id], Some(id), lifecycle, None));
        }

        // The interrupt frame stays in this builder until a reaction needs it.
        let mut trial = Some(self.ledger.open_builder(self.ledger.tip())?);
        lifecycle.advance(DescriptorState::Interrupt)?;
        let mut proposed = TransactionDescriptor::new(input.clone());
        proposed.phase = InterruptionPhase::Interrupt;

        let mut interrupt = None;
        let mut reaction_frames = Vec::new();
        for reactor in &self.reactors {
            for reaction in reactor.react(&self.ledger.view_tip(), &proposed) {
                if let Some(builder) = trial.take() {
                    if let Err(reason) = self.rules.validate(&self.ledger.view_tip(), &reaction) {
                        debug!(%reason, "Reaction skipped");
                        trial = Some(builder);
                        continue;
                    }
                    let id = builder.commit(
                        TransactionDescriptor::new(input.clone()),
                        InterruptionPhase::Interrupt,
                    )?;
                    interrupt = Some(id);
                }
                match self.submit(reaction) {
                    Ok(nested) => reaction_frames.extend(nested.frames),
                    Err(LedgerError::StaleProposal(reason)) => {
                        debug!(%reason, "Reaction skipped");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let interrupt = match interrupt {
            Some(id) => id,
            None => {
                if let Some(builder) = trial.take() {
                    builder.discard();
                }
                lifecycle.advance(DescriptorState::Discarded)?;
                let id = self.commit_effects(&input, lifecycle.commit_phase()?)?;
                lifecycle.advance(DescriptorState::Committed)?;
                return Ok(report(vec![id], Some(id), lifecycle, None));
            }
        };

        let mut frames = vec![interrupt];
        frames.extend(reaction_frames);
        if let Err(reason) = self.rules.validate(&self.ledger.view_tip(), &input) {
            lifecycle.advance(DescriptorState::Fizzled)?;
            warn!(action = %input.action, %reason, "Resume no longer legal, action fizzled");
            return Ok(report(frames, None, lifecycle, Some(reason)));
        }
        lifecycle.advance(DescriptorState::Resume)?;
        let id = self.commit_effects(&input, lifecycle.commit_phase()?)?;
        lifecycle.advance(DescriptorState::Committed)?;
        frames.push(id);
        Ok(report(frames, Some(id), lifecycle, None))
    }

    /// Apply `input` on top of the tip and commit it with `phase`.
    fn commit_effects(
        &self,
        input: &DescriptorInput,
        phase: InterruptionPhase,
    ) -> Result<FrameId, LedgerError> {
        let parent = self.ledger.tip();
        let mut outcomes = OutcomeRecorder::recording(outcome_seed(self.seed, parent, input)?);
        let mut builder = self.ledger.open_builder(parent)?;
        self.rules.apply(&mut builder, input, &mut outcomes)?;
        let output = outcomes.finish()?;
        builder.commit(TransactionDescriptor::new(input.clone()).with_output(output), phase)
    }
}

fn report(
    frames: Vec<FrameId>,
    final_frame: Option<FrameId>,
    lifecycle: Lifecycle,
    stale_reason: Option<String>,
) -> SubmitReport {
    SubmitReport {
        frames,
        final_frame,
        state: lifecycle.state(),
        trail: lifecycle.trail().to_vec(),
        stale_reason,
    }
}
