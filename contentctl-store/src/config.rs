//! Configuration loading
//!
//! Priority order (highest to lowest):
//! 1. `DATABASE_URL` / `REDIS_URL` environment variables (`.env` files included)
//! 2. `./contentctl.toml`, or the path passed explicitly
//! 3. `~/.contentctl/config.toml`
//! 4. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

/// Load environment variables from .env files
///
/// The current directory wins over `~/.contentctl/.env`; variables already
/// present in the environment are never overwritten.
pub fn load_dotenv() {
    let mut loaded_from = Vec::new();

    if let Ok(path) = dotenvy::dotenv() {
        loaded_from.push(path.display().to_string());
    }

    if let Some(env_file) = config_dir().map(|d| d.join(".env")) {
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => loaded_from.push(env_file.display().to_string()),
                Err(e) => debug!("Failed to load {}: {}", env_file.display(), e),
            }
        }
    }

    if loaded_from.is_empty() {
        debug!("No .env files found, using process environment only");
    } else {
        info!("Loaded environment from: {}", loaded_from.join(", "));
    }
}

/// Get the contentctl config directory path (~/.contentctl)
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".contentctl"))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub migrations: MigrationsConfig,
}

/// Durable store connection and pool sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connections idle longer than this are closed
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Bound on opening the pool and on each acquire
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Cache tier session, reconnection policy and entry lifetime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// `redis://...`, or `memory://` for an in-process cache
    #[serde(default = "default_cache_url")]
    pub url: String,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    #[serde(default)]
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: default_cache_url(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            default_ttl_secs: default_ttl_secs(),
            command_timeout_ms: default_command_timeout_ms(),
            key_prefix: String::new(),
        }
    }
}

impl CacheConfig {
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationsConfig {
    /// Tracking table name
    #[serde(default = "default_migrations_table")]
    pub table: String,

    /// Directory of `*.sql` scripts; the built-in set is used when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Refuse to run when a pending script sorts before an applied one
    #[serde(default = "default_check_order")]
    pub check_order: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            table: default_migrations_table(),
            dir: None,
            check_order: default_check_order(),
        }
    }
}

// Default value functions for serde
fn default_database_url() -> String {
    "postgres://localhost/contentctl".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_cache_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_base_delay_ms() -> u64 {
    100
}

/// Longest accepted cache TTL (ten years).
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_ttl_secs() -> u64 {
    300
}

fn default_command_timeout_ms() -> u64 {
    500
}

fn default_migrations_table() -> String {
    "pgmigrations".to_string()
}

fn default_check_order() -> bool {
    true
}

impl Config {
    /// Load config from TOML files and the environment.
    ///
    /// An explicit `path` must exist and parse. The default locations are
    /// optional and a broken file there is logged and skipped.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut merged = toml::Value::Table(Default::default());

        if let Some(global) = config_dir().map(|d| d.join("config.toml")) {
            if let Some(value) = read_optional(&global) {
                merge_toml(&mut merged, value);
            }
        }

        match path {
            Some(explicit) => {
                let contents = std::fs::read_to_string(explicit).map_err(|e| {
                    StoreError::config(format!("cannot read {}: {}", explicit.display(), e))
                })?;
                let value = contents.parse::<toml::Value>().map_err(|e| {
                    StoreError::config(format!("cannot parse {}: {}", explicit.display(), e))
                })?;
                debug!("Loaded config from {}", explicit.display());
                merge_toml(&mut merged, value);
            }
            None => {
                if let Some(value) = read_optional(Path::new("contentctl.toml")) {
                    merge_toml(&mut merged, value);
                }
            }
        }

        let mut config: Config = merged
            .try_into()
            .map_err(|e: toml::de::Error| StoreError::config(e.to_string()))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the built-in defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).map_err(|e| StoreError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DATABASE_URL` and `REDIS_URL` overrides from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.database.url = url;
        }
        if let Some(url) = lookup("REDIS_URL").filter(|v| !v.is_empty()) {
            self.cache.url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(StoreError::config("database.url is empty"));
        }
        if self.database.max_connections == 0 {
            return Err(StoreError::config("database.max_connections must be at least 1"));
        }
        if self.cache.default_ttl_secs > MAX_TTL_SECS {
            return Err(StoreError::config(format!(
                "cache.default_ttl_secs must be at most {}",
                MAX_TTL_SECS
            )));
        }
        if !is_identifier(&self.migrations.table) {
            return Err(StoreError::config(format!(
                "migrations.table '{}' is not a plain SQL identifier",
                self.migrations.table
            )));
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, safe to splice into DDL.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn read_optional(path: &Path) -> Option<toml::Value> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => match contents.parse::<toml::Value>() {
            Ok(value) => {
                debug!("Loaded config from {}", path.display());
                Some(value)
            }
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            debug!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

/// Merge `overlay` into `base`, table by table (overlay wins on leaves).
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
