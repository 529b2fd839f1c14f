//! Entry point for loading `AnnalConfig`.

use super::merge::merge_policy;
use super::sources::{env, global_file, workspace_file};
use super::AnnalConfig;
use crate::error::LedgerError;
use config::{File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the layered configuration for the workspace at `workspace_root`.
    ///
    /// Order: defaults, global file, `<root>/.annal/config.toml`, then
    /// `ANNAL_` environment variables. The result is validated.
    pub fn load(workspace_root: &Path) -> Result<AnnalConfig, LedgerError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = env::add_to_builder(builder);

        let config: AnnalConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Self::validated(config)
    }

    /// Load a single explicit file over the defaults; no other layers apply.
    pub fn load_from_file(path: &Path) -> Result<AnnalConfig, LedgerError> {
        if !path.exists() {
            return Err(LedgerError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config: AnnalConfig = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        debug!(config_path = %path.display(), "Configuration loaded from file");
        Self::validated(config)
    }

    pub fn default() -> AnnalConfig {
        AnnalConfig::default()
    }

    /// Path of the global config file, when a home directory is known.
    pub fn xdg_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    fn validated(config: AnnalConfig) -> Result<AnnalConfig, LedgerError> {
        config.validate().map_err(|errors| {
            let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            LedgerError::ConfigError(joined.join("; "))
        })?;
        Ok(config)
    }
}
