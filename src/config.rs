//! Configuration module for Hoard.

use serde::Deserialize;
use std::path::Path;

use crate::{HoardError, Result};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins. Empty means any origin without credentials.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3123
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/hoard.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Storage root. Holds the per-user trees and the staging area.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Size of one upload/download chunk in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: u64,
    /// Upload sessions older than this are reclaimed by GC.
    #[serde(default = "default_session_max_age")]
    pub session_max_age_hours: u64,
    /// Interval of the background GC sweep in seconds (0 = startup only).
    #[serde(default = "default_gc_interval")]
    pub gc_interval_secs: u64,
    /// Largest file accepted by an upload session.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
}

fn default_storage_root() -> String {
    "storage".to_string()
}

fn default_chunk_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

fn default_session_max_age() -> u64 {
    24
}

fn default_gc_interval() -> u64 {
    3600 // 1 hour
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024 * 1024 // 5GB
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            chunk_size_bytes: default_chunk_size(),
            session_max_age_hours: default_session_max_age(),
            gc_interval_secs: default_gc_interval(),
            max_file_size_bytes: default_max_file_size(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// JWT secret key (required).
    #[serde(default)]
    pub jwt_secret: String,
    /// Access token expiry in seconds.
    #[serde(default = "default_access_expiry")]
    pub access_token_expiry_secs: u64,
    /// Rate limit for the login endpoint (requests per minute per IP).
    #[serde(default = "default_login_rate_limit")]
    pub login_rate_limit: u32,
    /// Username of the bootstrap administrator.
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    /// Password of the bootstrap administrator. Empty disables bootstrap.
    #[serde(default)]
    pub admin_password: String,
}

fn default_access_expiry() -> u64 {
    86400 // 24 hours
}

fn default_login_rate_limit() -> u32 {
    5
}

fn default_admin_username() -> String {
    "admin".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_expiry_secs: default_access_expiry(),
            login_rate_limit: default_login_rate_limit(),
            admin_username: default_admin_username(),
            admin_password: String::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/hoard.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// File storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(HoardError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| HoardError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `HOARD_JWT_SECRET`: Override the JWT secret key
    /// - `HOARD_ADMIN_PASSWORD`: Override the bootstrap administrator password
    pub fn apply_env_overrides(&mut self) {
        if let Ok(jwt_secret) = std::env::var("HOARD_JWT_SECRET") {
            if !jwt_secret.is_empty() {
                self.auth.jwt_secret = jwt_secret;
            }
        }
        if let Ok(password) = std::env::var("HOARD_ADMIN_PASSWORD") {
            if !password.is_empty() {
                self.auth.admin_password = password;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(HoardError::Config(
                "jwt_secret is not set. \
                 Set it in config.toml or via HOARD_JWT_SECRET environment variable."
                    .to_string(),
            ));
        }
        if self.storage.chunk_size_bytes == 0 {
            return Err(HoardError::Config(
                "chunk_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.storage.chunk_size_bytes > self.storage.max_file_size_bytes {
            return Err(HoardError::Config(
                "chunk_size_bytes must not exceed max_file_size_bytes".to_string(),
            ));
        }
        Ok(())
    }
}
