//! Frame digest computation
//!
//! Digest = hash("frame:" || position || "parent:" || parent || parent_digest
//!               || "objects:" || count || (handle || object)* || "cause:" || cause)
//!
//! Objects are visited in handle order and every component is bincode-encoded,
//! so identical frames always produce identical digests.

use crate::error::StorageError;
use crate::frame::FrameCause;
use crate::object::StateObject;
use crate::types::{FrameId, Handle, Hash};
use blake3::Hasher;
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn compute_frame_digest(
    id: FrameId,
    parent: Option<FrameId>,
    parent_digest: &Hash,
    objects: &BTreeMap<Handle, Arc<StateObject>>,
    cause: &FrameCause,
) -> Result<Hash, StorageError> {
    let mut hasher = Hasher::new();

    hasher.update(b"frame:");
    hasher.update(&id.position().to_le_bytes());

    hasher.update(b"parent:");
    match parent {
        Some(p) => {
            hasher.update(&[1u8]);
            hasher.update(&p.position().to_le_bytes());
        }
        None => {
            hasher.update(&[0u8]);
        }
    }
    hasher.update(parent_digest);

    hasher.update(b"objects:");
    hasher.update(&(objects.len() as u64).to_le_bytes());
    for (handle, object) in objects {
        hasher.update(&handle.raw().to_le_bytes());
        hasher.update(&encode("state object", object.as_ref())?);
    }

    hasher.update(b"cause:");
    hasher.update(&encode("frame cause", cause)?);

    Ok(*hasher.finalize().as_bytes())
}

fn encode<T: serde::Serialize + ?Sized>(
    what: &'static str,
    value: &T,
) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::Encode {
        what,
        reason: e.to_string(),
    })
}
