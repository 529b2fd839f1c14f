//! CLI parse: clap types for annal. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// annal CLI - inspect and maintain a persisted state ledger
#[derive(Parser, Debug)]
#[command(name = "annal")]
#[command(about = "Deterministic append-only state ledger")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Summarize the saved ledger
    Inspect,
    /// List frames from a position onward
    Frames {
        /// First position to list (defaults to the origin)
        #[arg(long)]
        from: Option<u64>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show one object version
    Get {
        /// Raw handle value
        #[arg(long)]
        handle: u64,
        /// Frame position (defaults to the tip)
        #[arg(long)]
        at: Option<u64>,
    },
    /// Load with full validation and report the tip digest
    Verify,
    /// Fold every frame up to a position into a boundary and save
    Compact {
        /// Last position folded into the boundary
        #[arg(long)]
        through: u64,
        /// Object kinds to drop (repeatable; defaults to compaction.drop_kinds)
        #[arg(long = "drop-kind")]
        drop_kind: Vec<String>,
    },
}
