//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources override earlier ones key by key: defaults, then the global
//! file, then the workspace file, then `ANNAL_` environment variables.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("ledger.max_reaction_depth", 16_i64)?
        .set_default("ledger.seed", 0_i64)?
        .set_default("compaction.enabled", false)?
        .set_default("compaction.max_retained_frames", 4096_i64)?
        .set_default("compaction.keep_recent", 256_i64)?
        .set_default("storage.backend", "file")?
        .set_default("storage.path", ".annal/ledger")
}
