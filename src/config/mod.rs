//! Configuration management for tokenkeeper

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::session::SessionSettings;

/// Default GraphQL endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/graphql";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// GraphQL endpoint serving the auth mutations
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Directory holding the credential database
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,

    /// Session timing
    #[serde(default)]
    pub session: SessionConfig,
}

/// Session timing, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime the client assigns to each freshly issued token
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// How long before expiry to renew
    #[serde(default = "default_renewal_lead_secs")]
    pub renewal_lead_secs: u64,

    /// Backoff between failed renewals
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Where to send the user after logout
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_duration_secs() -> u64 {
    3600
}

fn default_renewal_lead_secs() -> u64 {
    600
}

fn default_retry_delay_secs() -> u64 {
    30
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            renewal_lead_secs: default_renewal_lead_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            login_path: default_login_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            storage_dir: None,
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".tokenkeeper").join("config.yaml"))
    }

    /// Resolve an optional override to a concrete path
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Load configuration, falling back to defaults when the default file is absent.
    ///
    /// An explicitly requested file that does not exist is an error.
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        let resolved = Self::resolve_path(path)?;
        if !resolved.exists() {
            if path.is_some() {
                return Err(
                    ConfigError::NotFound(resolved.display().to_string()).into(),
                );
            }
            log::debug!("No config at {}, using defaults", resolved.display());
            return Ok(Self::default());
        }
        Self::load_from(&resolved)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(path, contents)?;

        // Set file permissions to 600 on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Reject timings that would make the scheduler spin
    pub fn validate(&self) -> Result<()> {
        if self.session.duration_secs == 0 {
            return Err(ConfigError::Invalid("session.duration_secs must be > 0".to_string()).into());
        }
        if self.session.renewal_lead_secs >= self.session.duration_secs {
            return Err(ConfigError::Invalid(format!(
                "session.renewal_lead_secs ({}) must be shorter than session.duration_secs ({})",
                self.session.renewal_lead_secs, self.session.duration_secs
            ))
            .into());
        }
        if self.session.retry_delay_secs == 0 {
            return Err(
                ConfigError::Invalid("session.retry_delay_secs must be > 0".to_string()).into(),
            );
        }
        if !self.session.login_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "session.login_path must be absolute, got '{}'",
                self.session.login_path
            ))
            .into());
        }
        Ok(())
    }

    /// Directory for the credential database
    pub fn storage_dir(&self) -> Result<PathBuf> {
        match &self.storage_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::storage::SqliteBackend::default_dir().map_err(Into::into),
        }
    }

    /// Session timings as used by the session manager
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            session_duration: Duration::from_secs(self.session.duration_secs),
            renewal_lead: Duration::from_secs(self.session.renewal_lead_secs),
            retry_delay: Duration::from_secs(self.session.retry_delay_secs),
            login_path: self.session.login_path.clone(),
        }
    }
}
