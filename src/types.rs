//! Core identifier types shared across the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte blake3 digest
pub type Hash = [u8; 32];

/// Opaque, never-reused identifier for a versioned state object.
///
/// Handles are issued by the ledger's allocator starting at 1. They are keys,
/// not numbers: there is deliberately no arithmetic on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    /// Reconstruct a handle from its raw value (persistence, wire, CLI input).
    pub const fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h#{}", self.0)
    }
}

/// Position of a frame in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(u64);

impl FrameId {
    /// Position of the genesis boundary frame.
    pub const GENESIS: FrameId = FrameId(0);

    pub const fn new(position: u64) -> Self {
        FrameId(position)
    }

    pub const fn position(self) -> u64 {
        self.0
    }

    /// The position immediately after this one.
    pub const fn next(self) -> Self {
        FrameId(self.0 + 1)
    }

    /// The position immediately before this one, if any.
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(FrameId)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Ledger-owned handle allocator.
///
/// Lives inside ledger state so that replaying the same descriptor sequence
/// issues the same handles. Issued values are never handed out twice, even when
/// the builder that requested them is discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleAllocator {
    next: u64,
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleAllocator {
    pub fn new() -> Self {
        HandleAllocator { next: 1 }
    }

    /// Resume allocation from a persisted watermark.
    pub fn resume_at(next: u64) -> Self {
        HandleAllocator { next: next.max(1) }
    }

    pub fn allocate(&mut self) -> Handle {
        let handle = Handle(self.next);
        self.next += 1;
        handle
    }

    /// The value the next allocation will return.
    pub fn watermark(&self) -> u64 {
        self.next
    }

    /// Whether `handle` could have been issued by this allocator.
    pub fn has_issued(&self, handle: Handle) -> bool {
        handle.0 != 0 && handle.0 < self.next
    }
}
