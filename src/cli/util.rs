//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigLoader};
use crate::constants::storage;
use crate::pipeline::Orchestrator;
use crate::storage::{Database, PoolConfig, SharedDatabase};
use crate::types::{CaseError, CaseImage, ImageDomain, Result, RunMode};
use crate::versioning::CaseService;

/// Command execution context
///
/// Created via `CommandContext::load()` for commands that touch the case
/// database.
#[derive(Clone)]
pub struct CommandContext {
    pub config: Config,
    pub db: SharedDatabase,
}

impl CommandContext {
    /// Validates initialization, loads config, and opens the database.
    pub fn load() -> Result<Self> {
        require_initialized()?;
        let config = ConfigLoader::load()?;
        let db = open_database(&config)?;

        Ok(Self {
            config,
            db: Arc::new(db),
        })
    }

    pub fn service(&self) -> CaseService {
        CaseService::new(
            self.db.clone(),
            self.db.clone(),
            self.config.credits.clone(),
        )
    }

    /// Endpoints for `mode`; fails when a required API key is missing
    pub fn orchestrator(&self, mode: RunMode) -> Result<Orchestrator> {
        Orchestrator::from_config(&self.config, mode)
    }
}

/// Returns the data directory if initialized
pub fn require_initialized() -> Result<PathBuf> {
    let data_dir = Path::new(storage::DATA_DIR);

    if !data_dir.exists() {
        return Err(CaseError::Config(
            "Not initialized. Run 'casewise init' first.".to_string(),
        ));
    }

    Ok(data_dir.to_path_buf())
}

pub fn is_initialized() -> bool {
    ConfigLoader::is_project_initialized()
}

/// Open (creating if needed) and initialize the case database
pub fn open_database(config: &Config) -> Result<Database> {
    let path = config.storage.resolved_path();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::open_with_config(&path, PoolConfig::with_max_size(config.storage.pool_size))?;
    db.initialize()?;
    Ok(db)
}

/// Read image files, all tagged with `domain`
pub fn read_images(paths: &[PathBuf], domain: ImageDomain) -> Result<Vec<CaseImage>> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)?;
            if bytes.is_empty() {
                return Err(CaseError::validation(
                    "image",
                    format!("{} is empty", path.display()),
                ));
            }
            Ok(CaseImage::new(bytes, domain))
        })
        .collect()
}

/// Case text from the argument, or from a file when `file` is given
pub fn read_case_text(text: Option<String>, file: Option<&Path>) -> Result<String> {
    match (text, file) {
        (_, Some(path)) => Ok(std::fs::read_to_string(path)?),
        (Some(text), None) => Ok(text),
        (None, None) => Err(CaseError::validation(
            "case_text",
            "provide the case text or --file",
        )),
    }
}

/// Token cancelled on Ctrl-C
pub fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            child.cancel();
        }
    });
    token
}
