//! Transaction Descriptors
//!
//! The recorded cause of a frame. The input section, together with the ledger
//! state at submission, determines which objects change and how. The output
//! section holds results that cannot be re-derived from the input (random
//! draws, externally supplied values) so that replay is exact.

pub mod lifecycle;
pub mod outcome;
pub mod pipeline;

pub use lifecycle::{DescriptorState, Lifecycle};
pub use outcome::OutcomeRecorder;
pub use pipeline::{Pipeline, Reactor, RuleSet, SubmitReport};

use crate::types::Handle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Interruption phase of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterruptionPhase {
    /// Provisional trial step that lets reactors respond; no lasting effect.
    Interrupt,
    /// Self-contained final step.
    None,
    /// Final step completing an action that went through `Interrupt`.
    Resume,
}

impl InterruptionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptionPhase::Interrupt => "interrupt",
            InterruptionPhase::None => "none",
            InterruptionPhase::Resume => "resume",
        }
    }

    /// Whether a frame with this phase has permanent effects.
    pub fn is_final(&self) -> bool {
        !matches!(self, InterruptionPhase::Interrupt)
    }
}

/// Parameter value carried in descriptor sections
///
/// A closed set of canonical, bincode-friendly values. Maps use `BTreeMap`
/// so encodings are byte-stable across peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Bool(bool),
    Text(String),
    Handle(Handle),
    Bytes(Vec<u8>),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            ParamValue::Handle(h) => Some(*h),
            _ => None,
        }
    }
}

/// Input section: who did what, with which parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorInput {
    pub action: String,
    pub actor: Option<Handle>,
    pub targets: Vec<Handle>,
    pub params: BTreeMap<String, ParamValue>,
}

impl DescriptorInput {
    pub fn new(action: impl Into<String>) -> Self {
        DescriptorInput {
            action: action.into(),
            actor: None,
            targets: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_actor(mut self, actor: Handle) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_target(mut self, target: Handle) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// Every handle this input mentions: actor, targets, then handle params.
    pub fn referenced_handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.actor.into_iter().collect();
        handles.extend(self.targets.iter().copied());
        handles.extend(self.params.values().filter_map(ParamValue::as_handle));
        handles
    }
}

/// One recorded, non-derivable result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub label: String,
    pub value: ParamValue,
}

/// Output section, in the order results were produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorOutput {
    pub records: Vec<OutcomeRecord>,
}

impl DescriptorOutput {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record with the given label.
    pub fn get(&self, label: &str) -> Option<&ParamValue> {
        self.records
            .iter()
            .find(|r| r.label == label)
            .map(|r| &r.value)
    }
}

/// The recorded cause of a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDescriptor {
    pub input: DescriptorInput,
    pub output: DescriptorOutput,
    pub phase: InterruptionPhase,
}

impl TransactionDescriptor {
    /// A descriptor with an empty output section. The phase is assigned at commit.
    pub fn new(input: DescriptorInput) -> Self {
        TransactionDescriptor {
            input,
            output: DescriptorOutput::default(),
            phase: InterruptionPhase::None,
        }
    }

    pub fn with_output(mut self, output: DescriptorOutput) -> Self {
        self.output = output;
        self
    }

    pub fn action(&self) -> &str {
        &self.input.action
    }
}
