//! State Objects
//!
//! A state object is one version of a versioned entity: its handle, a category
//! label, and an opaque payload. The ledger never interprets payload bytes; the
//! rule layer owns their layout and uses the bincode helpers here to move typed
//! values in and out.
//!
//! Objects never point at each other. Relationships are `Handle` values inside
//! payloads, resolved through the ledger at read time.

use crate::error::StorageError;
use crate::types::{FrameId, Handle};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Category of a state object (`unit`, `item`, `ability`, ...)
///
/// The kind may change over an object's life; the handle never does.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKind(String);

impl ObjectKind {
    pub fn new(kind: impl Into<String>) -> Self {
        ObjectKind(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectKind {
    fn from(kind: &str) -> Self {
        ObjectKind::new(kind)
    }
}

impl From<String> for ObjectKind {
    fn from(kind: String) -> Self {
        ObjectKind(kind)
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One version of a state object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateObject {
    handle: Handle,
    born: FrameId,
    pub kind: ObjectKind,
    pub payload: Vec<u8>,
    destroyed: bool,
}

impl StateObject {
    pub(crate) fn new(handle: Handle, born: FrameId, kind: ObjectKind, payload: Vec<u8>) -> Self {
        StateObject {
            handle,
            born,
            kind,
            payload,
            destroyed: false,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Position of the frame that created this handle.
    pub fn born(&self) -> FrameId {
        self.born
    }

    /// Tombstone versions mark the end of the handle's validity window.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    /// Decode the payload as `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        bincode::deserialize(&self.payload).map_err(|e| StorageError::Decode {
            what: "object payload",
            reason: e.to_string(),
        })
    }

    /// Replace the payload with the bincode encoding of `value`.
    pub fn encode<T: Serialize>(&mut self, value: &T) -> Result<(), StorageError> {
        self.payload = encode_payload(value)?;
        Ok(())
    }

    /// Decode, mutate and re-encode the payload in one step.
    pub fn update<T, F>(&mut self, f: F) -> Result<(), StorageError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let mut value: T = self.decode()?;
        f(&mut value);
        self.encode(&value)
    }
}

/// Encode a typed payload value.
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::Encode {
        what: "object payload",
        reason: e.to_string(),
    })
}
