//! Outcome recording
//!
//! Randomized results are drawn from a blake3 XOF stream keyed by the ledger
//! seed, the parent position and the encoded input, then written into the
//! descriptor's output section. In replay mode the recorder serves the
//! recorded values back instead of drawing, so replay never re-derives them.

use crate::error::{LedgerError, StorageError};
use crate::transaction::{DescriptorInput, DescriptorOutput, OutcomeRecord, ParamValue};
use crate::types::{FrameId, Hash};
use blake3::{Hasher, OutputReader};

/// Derive the draw seed for a descriptor applied on top of `parent`.
pub fn outcome_seed(
    ledger_seed: u64,
    parent: FrameId,
    input: &DescriptorInput,
) -> Result<Hash, StorageError> {
    let encoded = bincode::serialize(input).map_err(|e| StorageError::Encode {
        what: "descriptor input",
        reason: e.to_string(),
    })?;

    let mut hasher = Hasher::new();
    hasher.update(b"seed:");
    hasher.update(&ledger_seed.to_le_bytes());
    hasher.update(b"parent:");
    hasher.update(&parent.position().to_le_bytes());
    hasher.update(b"input:");
    hasher.update(&encoded);
    Ok(*hasher.finalize().as_bytes())
}

enum Mode {
    Record,
    Replay {
        recorded: Vec<OutcomeRecord>,
        cursor: usize,
    },
}

/// Produces and records non-derivable results for one descriptor.
pub struct OutcomeRecorder {
    stream: OutputReader,
    mode: Mode,
    records: Vec<OutcomeRecord>,
}

impl OutcomeRecorder {
    /// Fresh recorder that draws from the seeded stream.
    pub fn recording(seed: Hash) -> Self {
        OutcomeRecorder {
            stream: Self::stream_for(seed),
            mode: Mode::Record,
            records: Vec::new(),
        }
    }

    /// Recorder that returns `recorded` values in order.
    pub fn replaying(seed: Hash, recorded: DescriptorOutput) -> Self {
        OutcomeRecorder {
            stream: Self::stream_for(seed),
            mode: Mode::Replay {
                recorded: recorded.records,
                cursor: 0,
            },
            records: Vec::new(),
        }
    }

    fn stream_for(seed: Hash) -> OutputReader {
        let mut hasher = Hasher::new_keyed(&seed);
        hasher.update(b"outcomes");
        hasher.finalize_xof()
    }

    pub fn is_replaying(&self) -> bool {
        matches!(self.mode, Mode::Replay { .. })
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.stream.fill(&mut buf);
        u64::from_le_bytes(buf)
    }

    /// Uniform draw in `[low, high]`, recorded under `label`.
    pub fn roll(&mut self, label: &str, low: i64, high: i64) -> Result<i64, LedgerError> {
        if low > high {
            return Err(LedgerError::Rule(format!(
                "empty roll range {}..={} for '{}'",
                low, high, label
            )));
        }
        if let Some(value) = self.replay_next(label)? {
            return match value.as_int() {
                Some(v) if (low..=high).contains(&v) => {
                    self.records.push(OutcomeRecord {
                        label: label.to_string(),
                        value,
                    });
                    Ok(v)
                }
                _ => Err(LedgerError::Rule(format!(
                    "recorded value for '{}' is outside {}..={}",
                    label, low, high
                ))),
            };
        }

        let span = (i128::from(high) - i128::from(low) + 1) as u128;
        let drawn = if span > u128::from(u64::MAX) {
            self.next_u64() as i64
        } else {
            let span = span as u64;
            // Rejection sampling keeps the draw unbiased.
            let zone = u64::MAX - (u64::MAX % span);
            let mut x = self.next_u64();
            while x >= zone {
                x = self.next_u64();
            }
            (i128::from(low) + i128::from(x % span)) as i64
        };

        self.records.push(OutcomeRecord {
            label: label.to_string(),
            value: ParamValue::Int(drawn),
        });
        Ok(drawn)
    }

    /// `numerator / denominator` chance, recorded under `label`.
    pub fn chance(
        &mut self,
        label: &str,
        numerator: u32,
        denominator: u32,
    ) -> Result<bool, LedgerError> {
        if denominator == 0 || numerator > denominator {
            return Err(LedgerError::Rule(format!(
                "invalid chance {}/{} for '{}'",
                numerator, denominator, label
            )));
        }
        if let Some(value) = self.replay_next(label)? {
            let hit = value.as_bool().ok_or_else(|| {
                LedgerError::Rule(format!("recorded value for '{}' is not a bool", label))
            })?;
            self.records.push(OutcomeRecord {
                label: label.to_string(),
                value,
            });
            return Ok(hit);
        }

        let roll = self.next_u64() % u64::from(denominator);
        let hit = roll < u64::from(numerator);
        self.records.push(OutcomeRecord {
            label: label.to_string(),
            value: ParamValue::Bool(hit),
        });
        Ok(hit)
    }

    /// Record an externally supplied value. In replay mode the recorded value
    /// wins over `value`.
    pub fn note(&mut self, label: &str, value: ParamValue) -> Result<ParamValue, LedgerError> {
        let value = match self.replay_next(label)? {
            Some(recorded) => recorded,
            None => value,
        };
        self.records.push(OutcomeRecord {
            label: label.to_string(),
            value: value.clone(),
        });
        Ok(value)
    }

    fn replay_next(&mut self, label: &str) -> Result<Option<ParamValue>, LedgerError> {
        match &mut self.mode {
            Mode::Record => Ok(None),
            Mode::Replay { recorded, cursor } => {
                let record = recorded.get(*cursor).ok_or_else(|| {
                    LedgerError::Rule(format!(
                        "replay requested '{}' but only {} outcomes were recorded",
                        label,
                        recorded.len()
                    ))
                })?;
                if record.label != label {
                    return Err(LedgerError::Rule(format!(
                        "replay expected outcome '{}' but rule asked for '{}'",
                        record.label, label
                    )));
                }
                *cursor += 1;
                Ok(Some(record.value.clone()))
            }
        }
    }

    /// Close the recorder and return the output section.
    pub fn finish(self) -> Result<DescriptorOutput, LedgerError> {
        if let Mode::Replay { recorded, cursor } = &self.mode {
            if *cursor != recorded.len() {
                return Err(LedgerError::Rule(format!(
                    "replay consumed {} of {} recorded outcomes",
                    cursor,
                    recorded.len()
                )));
            }
        }
        Ok(DescriptorOutput {
            records: self.records,
        })
    }
}
