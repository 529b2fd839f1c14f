//! Error types for the Annal state ledger.

use crate::transaction::DescriptorState;
use crate::types::{FrameId, Handle};
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },

    #[error("Failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("Database error: {0}")]
    Database(String),

    #[error("No ledger saved at {0}")]
    MissingLedger(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// Ledger errors
///
/// `NotFound` and `Compacted` are ordinary query outcomes. `BuilderAlreadyOpen`
/// and `ConcurrentAppendInProgress` are ordering defects in the caller and are
/// never retried or queued.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Handle {handle} not found at {at}")]
    NotFound { handle: Handle, at: FrameId },

    #[error("Position {at} has been compacted (origin is now {origin})")]
    Compacted { at: FrameId, origin: FrameId },

    #[error("Frame not found: {0}")]
    FrameNotFound(FrameId),

    #[error("A frame builder is already open")]
    BuilderAlreadyOpen,

    #[error("Another thread has an append in progress")]
    ConcurrentAppendInProgress,

    #[error("Stale proposal: {0}")]
    StaleProposal(String),

    #[error("Corrupt ledger: {0}")]
    CorruptLedger(String),

    #[error("Invalid descriptor transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: DescriptorState,
        to: DescriptorState,
    },

    #[error("Boundary frame is sealed: {0}")]
    BoundarySealed(String),

    #[error("Reaction chain exceeded maximum depth of {0}")]
    ReactionDepthExceeded(usize),

    #[error("Replay diverged at {at}: {reason}")]
    ReplayDivergence { at: FrameId, reason: String },

    #[error("Rule error: {0}")]
    Rule(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl LedgerError {
    /// Ordering defects: a caller opened a second builder or appended from the
    /// wrong thread. These indicate bugs, not runtime conditions.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            LedgerError::BuilderAlreadyOpen | LedgerError::ConcurrentAppendInProgress
        )
    }

    /// Query outcomes a reader is expected to handle.
    pub fn is_query_miss(&self) -> bool {
        matches!(
            self,
            LedgerError::NotFound { .. } | LedgerError::Compacted { .. }
        )
    }
}

impl From<config::ConfigError> for LedgerError {
    fn from(err: config::ConfigError) -> Self {
        LedgerError::ConfigError(err.to_string())
    }
}
