//! Command execution context
//!
//! Loads configuration, opens credential storage, builds the session manager
//! and resumes any stored session, so handlers start from a ready manager.

use std::path::PathBuf;
use std::sync::Arc;

use tokenkeeper::config::Config;
use tokenkeeper::error::Result;
use tokenkeeper::session::{LogNavigator, SessionManager};
use tokenkeeper::storage::SqliteBackend;
use tokenkeeper::GraphQlClient;

use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;

/// Context for command execution containing config, session and output options.
pub struct CommandContext {
    /// Loaded and validated configuration
    pub config: Config,
    /// Resolved config file location (may not exist)
    pub config_path: PathBuf,
    /// Session manager, already rehydrated
    pub manager: Arc<SessionManager>,
    /// Output format preference
    pub format: OutputFormat,
}

impl CommandContext {
    /// Create a new command context with full initialization.
    ///
    /// # Errors
    /// Returns error if config cannot be loaded, is invalid, or storage cannot be opened.
    pub async fn new(opts: &GlobalOptions) -> Result<Self> {
        let mut config = Config::load_at(opts.config_ref())?;
        if let Some(endpoint) = opts.endpoint_ref() {
            config.endpoint = endpoint.to_string();
        }
        config.validate()?;

        let config_path = Config::resolve_path(opts.config_ref())?;
        let storage_dir = config.storage_dir()?;
        log::debug!("Credential storage at {}", storage_dir.display());

        let transport = Arc::new(GraphQlClient::new(config.endpoint.clone())?);
        let backend = Arc::new(SqliteBackend::open_at(&storage_dir)?);
        let manager = SessionManager::new(
            transport,
            backend,
            Arc::new(LogNavigator),
            config.session_settings(),
        );
        manager.rehydrate().await;

        Ok(Self {
            config,
            config_path,
            manager,
            format: opts.format,
        })
    }
}
