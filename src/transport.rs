//! Wire codec for relaying descriptor inputs between peers.
//!
//! Layout: 4-byte little-endian format version, then the bincode-encoded
//! `DescriptorInput`. Peers submit relayed inputs locally, recompute the
//! output section, and compare `output_digest`s to confirm agreement.

use crate::error::{LedgerError, StorageError};
use crate::transaction::{DescriptorInput, DescriptorOutput, Pipeline, RuleSet, SubmitReport};
use crate::types::Hash;
use tracing::debug;

pub const WIRE_VERSION: u32 = 1;

pub fn encode_input(input: &DescriptorInput) -> Result<Vec<u8>, StorageError> {
    let body = bincode::serialize(input).map_err(|e| StorageError::Encode {
        what: "descriptor input",
        reason: e.to_string(),
    })?;
    let mut bytes = Vec::with_capacity(4 + body.len());
    bytes.extend_from_slice(&WIRE_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub fn decode_input(bytes: &[u8]) -> Result<DescriptorInput, StorageError> {
    if bytes.len() < 4 {
        return Err(StorageError::Decode {
            what: "descriptor input",
            reason: format!("{} bytes is too short for a version header", bytes.len()),
        });
    }
    let version = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if version != WIRE_VERSION {
        return Err(StorageError::UnsupportedVersion(version));
    }
    bincode::deserialize(&bytes[4..]).map_err(|e| StorageError::Decode {
        what: "descriptor input",
        reason: e.to_string(),
    })
}

/// blake3 over the bincode-encoded output section.
pub fn output_digest(output: &DescriptorOutput) -> Result<Hash, StorageError> {
    let encoded = bincode::serialize(output).map_err(|e| StorageError::Encode {
        what: "descriptor output",
        reason: e.to_string(),
    })?;
    Ok(*blake3::hash(&encoded).as_bytes())
}

/// Result of applying a relayed input
#[derive(Debug, Clone)]
pub struct RemoteSubmission {
    pub report: SubmitReport,
    /// Digest of the recomputed output section of the final frame; `None`
    /// when the action fizzled.
    pub output_digest: Option<Hash>,
}

impl<R: RuleSet> Pipeline<R> {
    /// Decode a peer's input section, submit it locally and digest the
    /// recomputed outputs.
    pub fn submit_remote(&self, bytes: &[u8]) -> Result<RemoteSubmission, LedgerError> {
        let input = decode_input(bytes)?;
        debug!(action = %input.action, "Relayed input decoded");
        let report = self.submit(input)?;
        let output_digest = match report.final_frame {
            Some(id) => {
                let cause = self.ledger().descriptor(id)?;
                match cause.as_transaction() {
                    Some(d) => Some(output_digest(&d.output)?),
                    None => None,
                }
            }
            None => None,
        };
        Ok(RemoteSubmission {
            report,
            output_digest,
        })
    }
}
