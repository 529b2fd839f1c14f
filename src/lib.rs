//! annal: Deterministic State Ledger
//!
//! An append-only ledger of immutable frames. Each frame holds the
//! post-change versions of the state objects it touched, keyed by opaque
//! handles, plus the transaction descriptor that caused it. Any position can
//! be read back, replaying the descriptors reproduces every frame digest,
//! and old prefixes can be folded into a single boundary frame.

pub mod cli;
pub mod compaction;
mod concurrency;
pub mod config;
pub mod error;
pub mod frame;
pub mod heads;
pub mod ledger;
pub mod logging;
pub mod object;
pub mod replay;
pub mod store;
pub mod transaction;
pub mod transport;
pub mod types;
pub mod view;

pub use compaction::{Compactor, DropKinds, RetainAll, RetentionPolicy};
pub use error::{LedgerError, StorageError};
pub use frame::{Frame, FrameBuilder, FrameCause};
pub use ledger::Ledger;
pub use object::{ObjectKind, StateObject};
pub use replay::{ReplayMode, Replayer};
pub use transaction::{
    DescriptorInput, DescriptorOutput, InterruptionPhase, ParamValue, Pipeline, Reactor, RuleSet,
    SubmitReport, TransactionDescriptor,
};
pub use types::{FrameId, Handle, Hash};
pub use view::View;
