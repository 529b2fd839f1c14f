//! CLI route: run context and the single route table.

use crate::cli::output::{format_frames_json, format_frames_text};
use crate::cli::parse::Commands;
use crate::compaction::{DropKinds, RetainAll, RetentionPolicy};
use crate::config::{AnnalConfig, ConfigLoader};
use crate::error::{LedgerError, StorageError};
use crate::ledger::Ledger;
use crate::store::{open_store, LedgerStore};
use crate::types::{FrameId, Handle};
use std::path::PathBuf;
use tracing::info;

/// Runtime context for CLI execution: workspace, loaded config and the store.
pub struct RunContext {
    workspace_root: PathBuf,
    config: AnnalConfig,
    store_path: PathBuf,
    store: Box<dyn LedgerStore>,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, LedgerError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        let store_path = config.storage.resolve_path(&workspace_root);
        let store = open_store(&config.storage, &workspace_root)?;
        Ok(Self {
            workspace_root,
            config,
            store_path,
            store,
        })
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    pub fn config(&self) -> &AnnalConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, LedgerError> {
        match command {
            Commands::Inspect => self.handle_inspect(),
            Commands::Frames { from, format } => self.handle_frames(*from, format),
            Commands::Get { handle, at } => self.handle_get(*handle, *at),
            Commands::Verify => self.handle_verify(),
            Commands::Compact { through, drop_kind } => self.handle_compact(*through, drop_kind),
        }
    }

    fn load_ledger(&self) -> Result<Ledger, LedgerError> {
        self.store.load()?.ok_or_else(|| {
            StorageError::MissingLedger(self.store_path.display().to_string()).into()
        })
    }

    fn handle_inspect(&self) -> Result<String, LedgerError> {
        let ledger = self.load_ledger()?;
        let origin = ledger.origin();
        let tip = ledger.tip();
        let live = ledger.live_handles(tip)?;
        Ok(format!(
            "Store: {}\nOrigin: {}\nTip: {}\nFrames: {}\nLive handles: {}\nNext handle: {}",
            self.store_path.display(),
            origin.position(),
            tip.position(),
            tip.position() - origin.position() + 1,
            live.len(),
            ledger.next_handle_watermark()
        ))
    }

    fn handle_frames(&self, from: Option<u64>, format: &str) -> Result<String, LedgerError> {
        let ledger = self.load_ledger()?;
        let start = from.map(FrameId::new).unwrap_or_else(|| ledger.origin());
        // Compacted before the origin, FrameNotFound past the tip.
        let mut frames = vec![ledger.frame(start)?];
        frames.extend(ledger.frames_since(start)?);

        match format {
            "json" => format_frames_json(&frames),
            "text" => Ok(format_frames_text(&frames)),
            other => Err(LedgerError::ConfigError(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }

    fn handle_get(&self, handle: u64, at: Option<u64>) -> Result<String, LedgerError> {
        let ledger = self.load_ledger()?;
        let at = at.map(FrameId::new).unwrap_or_else(|| ledger.tip());
        let object = ledger.get(Handle::from_raw(handle), at)?;
        Ok(format!(
            "Handle: {}\nAt: {}\nKind: {}\nBorn: {}\nPayload: {}",
            object.handle().raw(),
            at.position(),
            object.kind,
            object.born().position(),
            hex::encode(&object.payload)
        ))
    }

    fn handle_verify(&self) -> Result<String, LedgerError> {
        let ledger = self.load_ledger()?;
        let tip = ledger.tip();
        Ok(format!(
            "Ledger verified: origin {}, tip {}, digest {}",
            ledger.origin().position(),
            tip.position(),
            hex::encode(ledger.digest(tip)?)
        ))
    }

    fn handle_compact(&self, through: u64, drop_kind: &[String]) -> Result<String, LedgerError> {
        let ledger = self.load_ledger()?;
        let kinds: &[String] = if drop_kind.is_empty() {
            &self.config.compaction.drop_kinds
        } else {
            drop_kind
        };
        let retention: Box<dyn RetentionPolicy> = if kinds.is_empty() {
            Box::new(RetainAll)
        } else {
            Box::new(DropKinds::new(kinds.iter().cloned()))
        };

        let origin = ledger.compact(FrameId::new(through), retention.as_ref())?;
        self.store.save(&ledger)?;
        info!(origin = origin.position(), "Compacted ledger saved");
        Ok(format!(
            "Compacted through {}; origin is now {}, tip {}",
            through,
            origin.position(),
            ledger.tip().position()
        ))
    }
}
