// ⚙️ Configuration - environment-driven settings for CLI and server
// Anything unreachable here stops startup with a ConfigurationError

use crate::db::setup_database;
use crate::error::{IngestError, IngestResult};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DB_PATH_VAR: &str = "HOLDINGS_DB_PATH";
pub const BIND_ADDR_VAR: &str = "HOLDINGS_BIND_ADDR";
pub const USER_VAR: &str = "HOLDINGS_USER";
pub const MAX_UPLOAD_VAR: &str = "HOLDINGS_MAX_UPLOAD_MB";

pub const DEFAULT_DB_PATH: &str = "holdings.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind_addr: String,
    pub user: Option<String>,
    pub max_upload_mb: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            user: None,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
        }
    }
}

impl Config {
    /// Read settings from the process environment
    pub fn from_env() -> IngestResult<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Read settings from an explicit variable map
    pub fn from_vars(vars: &HashMap<String, String>) -> IngestResult<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let max_upload_mb = match get(MAX_UPLOAD_VAR) {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|mb| *mb > 0)
                .ok_or_else(|| {
                    IngestError::configuration(format!(
                        "{} must be a positive integer, got '{}'",
                        MAX_UPLOAD_VAR, raw
                    ))
                })?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };

        Ok(Config {
            db_path: get(DB_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            bind_addr: get(BIND_ADDR_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            user: get(USER_VAR)
                .or_else(|| get("USER"))
                .or_else(|| get("USERNAME")),
            max_upload_mb,
        })
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    /// Identity used to scope saved snapshots
    pub fn require_user(&self) -> IngestResult<&str> {
        self.user.as_deref().ok_or_else(|| {
            IngestError::configuration(format!(
                "no user identity configured (set {})",
                USER_VAR
            ))
        })
    }

    /// Open the snapshot store, creating tables on first use
    pub fn open_store(&self) -> IngestResult<Connection> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(IngestError::configuration(format!(
                    "database directory {} does not exist",
                    parent.display()
                )));
            }
        }

        let conn = Connection::open(&self.db_path).map_err(|e| {
            IngestError::configuration(format!(
                "cannot open database {}: {}",
                self.db_path.display(),
                e
            ))
        })?;

        setup_database(&conn).map_err(|e| {
            IngestError::configuration(format!(
                "cannot initialise database {}: {}",
                self.db_path.display(),
                e
            ))
        })?;

        log::info!("snapshot store ready at {}", self.db_path.display());
        Ok(conn)
    }
}
