//! # Configuration
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. An optional TOML file (`--config waypoint.toml`)
//! 2. `WAYPOINT_*` environment variables
//! 3. CLI flags (applied by the CLI module)
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! rate_limit = 100
//! cors_origins = "http://localhost:3000"
//! dev_owner = 1
//!
//! [storage]
//! backend = "redb"
//! database = "waypoint.redb"
//!
//! [[accounts]]
//! token = "secret-token"
//! owner = 7
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use waypoint_core::{OwnerId, WaypointError};

/// Maximum accepted config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

/// Which storage backend the planner runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Volatile, lost on exit.
    Memory,
    /// ACID database file.
    #[default]
    Redb,
}

impl std::str::FromStr for BackendKind {
    type Err = WaypointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "redb" => Ok(BackendKind::Redb),
            other => Err(WaypointError::InvalidInput(format!(
                "unknown backend '{other}' (expected memory or redb)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests per second; 0 disables limiting.
    pub rate_limit: u32,
    /// Comma-separated origins, `*`, or unset for localhost only.
    pub cors_origins: Option<String>,
    /// Owner every request acts as when no accounts are configured.
    pub dev_owner: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            rate_limit: 100,
            cors_origins: None,
            dev_owner: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Redb,
            database: PathBuf::from("waypoint.redb"),
        }
    }
}

/// A bearer token and the owner it authenticates as.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub token: String,
    pub owner: u64,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("token", &"<redacted>")
            .field("owner", &self.owner)
            .finish()
    }
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub accounts: Vec<Account>,
}

impl Config {
    /// Load from `path` (if given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, WaypointError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, WaypointError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            WaypointError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(WaypointError::InvalidInput(format!(
                "config file is {} bytes, limit is {}",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| WaypointError::Io(format!("Cannot read config: {}", e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, WaypointError> {
        toml::from_str(text)
            .map_err(|e| WaypointError::Serialization(format!("Invalid config: {}", e)))
    }

    /// Apply `WAYPOINT_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), WaypointError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("WAYPOINT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("WAYPOINT_PORT") {
            self.server.port = parse_number("WAYPOINT_PORT", &port)?;
        }
        if let Some(rate) = lookup("WAYPOINT_RATE_LIMIT") {
            self.server.rate_limit = parse_number("WAYPOINT_RATE_LIMIT", &rate)?;
        }
        if let Some(origins) = lookup("WAYPOINT_CORS_ORIGINS") {
            self.server.cors_origins = Some(origins);
        }
        if let Some(owner) = lookup("WAYPOINT_DEV_OWNER") {
            self.server.dev_owner = parse_number("WAYPOINT_DEV_OWNER", &owner)?;
        }
        if let Some(database) = lookup("WAYPOINT_DATABASE") {
            self.storage.database = PathBuf::from(database);
        }
        if let Some(backend) = lookup("WAYPOINT_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), WaypointError> {
        if let Some(account) = self.accounts.iter().find(|a| a.token.trim().is_empty()) {
            return Err(WaypointError::InvalidInput(format!(
                "account for owner {} has an empty token",
                account.owner
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn dev_owner(&self) -> OwnerId {
        OwnerId(self.server.dev_owner)
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, WaypointError> {
    value
        .trim()
        .parse()
        .map_err(|_| WaypointError::InvalidInput(format!("{key} must be a number, got '{value}'")))
}

// =============================================================================
// TESTS
// =============================================================================
