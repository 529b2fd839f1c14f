//! CLI output: error mapping and frame listings.

use crate::error::LedgerError;
use crate::frame::Frame;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;
use std::sync::Arc;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &LedgerError) -> String {
    match e {
        LedgerError::CorruptLedger(reason) => format!("Ledger rejected: {}", reason),
        other => other.to_string(),
    }
}

fn phase_label(frame: &Frame) -> &'static str {
    match frame.cause().phase() {
        Some(phase) => phase.as_str(),
        None => "boundary",
    }
}

fn digest_prefix(frame: &Frame) -> String {
    hex::encode(&frame.digest()[..6])
}

pub fn format_frames_text(frames: &[Arc<Frame>]) -> String {
    if frames.is_empty() {
        return "No frames.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Position", "Phase", "Action", "Objects", "Digest"]);
    for frame in frames {
        table.add_row(vec![
            frame.id().position().to_string(),
            phase_label(frame).to_string(),
            frame.cause().label().to_string(),
            frame.objects().len().to_string(),
            digest_prefix(frame),
        ]);
    }
    table.to_string()
}

pub fn format_frames_json(frames: &[Arc<Frame>]) -> Result<String, LedgerError> {
    let rows: Vec<serde_json::Value> = frames
        .iter()
        .map(|frame| {
            json!({
                "position": frame.id().position(),
                "parent": frame.parent().map(|p| p.position()),
                "phase": phase_label(frame),
                "action": frame.cause().label(),
                "objects": frame.objects().keys().map(|h| h.raw()).collect::<Vec<_>>(),
                "digest": hex::encode(frame.digest()),
            })
        })
        .collect();
    serde_json::to_string_pretty(&rows).map_err(|e| LedgerError::ConfigError(e.to_string()))
}
