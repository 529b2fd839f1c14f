//! Handle Heads
//!
//! Per-handle version history: the sorted list of frame positions that mention
//! each handle. Resolving "handle H as of frame F" is a binary search over
//! that list, O(log n) in the number of versions of H.

use crate::types::{FrameId, Handle};
use std::collections::{BTreeSet, HashMap};

/// Head index: Handle -> ascending positions that mention it
#[derive(Debug, Clone, Default)]
pub struct HeadIndex {
    pub(crate) heads: HashMap<Handle, Vec<FrameId>>,
}

impl HeadIndex {
    pub fn new() -> Self {
        HeadIndex {
            heads: HashMap::new(),
        }
    }

    /// Record that `frame` carries a version of `handle`.
    ///
    /// Positions arrive in ascending order; re-recording the latest position
    /// (boundary amendment) is a no-op.
    pub fn record(&mut self, handle: Handle, frame: FrameId) {
        let positions = self.heads.entry(handle).or_default();
        match positions.last() {
            Some(last) if *last >= frame => {}
            _ => positions.push(frame),
        }
    }

    /// Most recent position `<= at` that mentions `handle`.
    pub fn head_at(&self, handle: Handle, at: FrameId) -> Option<FrameId> {
        let positions = self.heads.get(&handle)?;
        let idx = positions.partition_point(|p| *p <= at);
        idx.checked_sub(1).and_then(|i| positions.get(i).copied())
    }

    /// Most recent position that mentions `handle`.
    pub fn latest(&self, handle: Handle) -> Option<FrameId> {
        self.heads.get(&handle).and_then(|p| p.last().copied())
    }

    /// Every position that mentions `handle`.
    pub fn history(&self, handle: Handle) -> &[FrameId] {
        self.heads.get(&handle).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All handles with at least one recorded version, in handle order.
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.heads.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Drop a position that was retracted from the tip.
    pub fn forget(&mut self, handle: Handle, frame: FrameId) {
        if let Some(positions) = self.heads.get_mut(&handle) {
            positions.retain(|p| *p != frame);
            if positions.is_empty() {
                self.heads.remove(&handle);
            }
        }
    }

    /// Forget every position after `at` (rolled-back pending frames).
    pub fn truncate_after(&mut self, at: FrameId) {
        self.heads.retain(|_, positions| {
            let keep = positions.partition_point(|p| *p <= at);
            positions.truncate(keep);
            !positions.is_empty()
        });
    }

    /// Rewrite history after compacting through `through`.
    ///
    /// Positions at or before `through` vanish; handles in `retained` gain the
    /// boundary position; handles left with no positions are removed.
    pub fn compact(&mut self, through: FrameId, retained: &BTreeSet<Handle>) {
        self.heads.retain(|handle, positions| {
            positions.retain(|p| *p > through);
            if retained.contains(handle) {
                positions.insert(0, through);
            }
            !positions.is_empty()
        });
        for handle in retained {
            self.heads.entry(*handle).or_insert_with(|| vec![through]);
        }
    }
}
