// persona-config/src/config.rs
// ============================================================================
// Module: Persona Configuration
// Description: Configuration loading and validation for the service.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: persona-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with a strict size limit; missing
//! or invalid configuration fails closed. Defaults reproduce the documented
//! pipeline constants (bounded queue of 1000, single consumer, 1 s profile
//! lock, 5 s unify lock, 10 x 100 ms lock retries) so an empty file yields a
//! working service over the in-memory store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use persona_core::runtime::LockConfig;
use persona_core::runtime::PipelineConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "persona.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "PERSONA_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;

/// Default HTTP bind port.
const DEFAULT_BIND_PORT: u16 = 8080;
/// Default pipeline worker count.
const DEFAULT_WORKERS: usize = 1;
/// Default bounded queue capacity per worker.
const DEFAULT_QUEUE_CAPACITY: usize = 1000;
/// Maximum allowed pipeline workers.
const MAX_WORKERS: usize = 64;
/// Maximum allowed queue capacity.
const MAX_QUEUE_CAPACITY: usize = 100_000;

/// Default profile lock TTL in milliseconds.
const DEFAULT_PROFILE_LOCK_TTL_MS: u64 = 1_000;
/// Default unify lock TTL in milliseconds.
const DEFAULT_UNIFY_LOCK_TTL_MS: u64 = 5_000;
/// Default lock acquisition attempts.
const DEFAULT_LOCK_MAX_ATTEMPTS: u32 = 10;
/// Default back-off between lock attempts in milliseconds.
const DEFAULT_LOCK_RETRY_DELAY_MS: u64 = 100;
/// Minimum accepted lock TTL in milliseconds.
const MIN_LOCK_TTL_MS: u64 = 100;
/// Maximum accepted lock TTL in milliseconds.
const MAX_LOCK_TTL_MS: u64 = 60_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file exceeds the size limit.
    #[error("config file too large: {actual} bytes (max {max})")]
    TooLarge {
        /// Maximum allowed bytes.
        max: usize,
        /// Actual file size in bytes.
        actual: usize,
    },
    /// Config file failed to parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A field failed validation.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PersonaConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Document store selection.
    #[serde(default)]
    pub store: StoreConfig,
    /// Async pipeline sizing.
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// Lock TTLs and retry policy.
    #[serde(default)]
    pub locks: LockSection,
    /// Audit log routing.
    #[serde(default)]
    pub audit: AuditConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Returns the default bind address.
fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], DEFAULT_BIND_PORT))
}

/// Store backend selection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-memory store for tests and demos; state is lost on restart.
    Memory,
    /// Durable `SQLite` store.
    Sqlite,
}

/// Document store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Selected backend.
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    /// Database file path for the `SQLite` backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
        }
    }
}

/// Returns the default store backend.
const fn default_backend() -> StoreBackend {
    StoreBackend::Memory
}

/// Async pipeline sizing section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    /// Number of partitioned queue consumers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bounded queue capacity per consumer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Returns the default worker count.
const fn default_workers() -> usize {
    DEFAULT_WORKERS
}

/// Returns the default queue capacity.
const fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl PipelineSection {
    /// Converts into the runtime pipeline configuration.
    #[must_use]
    pub const fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }
}

/// Lock TTL and retry policy section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockSection {
    /// TTL for per-profile writer locks in milliseconds.
    #[serde(default = "default_profile_lock_ttl_ms")]
    pub profile_ttl_ms: u64,
    /// TTL for unification locks in milliseconds.
    #[serde(default = "default_unify_lock_ttl_ms")]
    pub unify_ttl_ms: u64,
    /// Maximum acquisition attempts for profile locks.
    #[serde(default = "default_lock_max_attempts")]
    pub max_attempts: u32,
    /// Back-off between acquisition attempts in milliseconds.
    #[serde(default = "default_lock_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            profile_ttl_ms: default_profile_lock_ttl_ms(),
            unify_ttl_ms: default_unify_lock_ttl_ms(),
            max_attempts: default_lock_max_attempts(),
            retry_delay_ms: default_lock_retry_delay_ms(),
        }
    }
}

/// Returns the default profile lock TTL.
const fn default_profile_lock_ttl_ms() -> u64 {
    DEFAULT_PROFILE_LOCK_TTL_MS
}

/// Returns the default unify lock TTL.
const fn default_unify_lock_ttl_ms() -> u64 {
    DEFAULT_UNIFY_LOCK_TTL_MS
}

/// Returns the default lock attempt count.
const fn default_lock_max_attempts() -> u32 {
    DEFAULT_LOCK_MAX_ATTEMPTS
}

/// Returns the default lock retry delay.
const fn default_lock_retry_delay_ms() -> u64 {
    DEFAULT_LOCK_RETRY_DELAY_MS
}

impl LockSection {
    /// Converts into the runtime lock configuration.
    #[must_use]
    pub const fn to_lock_config(&self) -> LockConfig {
        LockConfig {
            profile_ttl: Duration::from_millis(self.profile_ttl_ms),
            unify_ttl: Duration::from_millis(self.unify_ttl_ms),
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Audit log routing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Selected sink.
    #[serde(default)]
    pub sink: AuditSinkKind,
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// Drop all audit events.
    Noop,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl PersonaConfig {
    /// Loads configuration from the explicit path, the `PERSONA_CONFIG`
    /// environment variable, or `persona.toml` in the working directory.
    /// A missing default file yields the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when reading, parsing, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match env::var_os(CONFIG_ENV_VAR) {
                Some(value) => (PathBuf::from(value), true),
                None => (PathBuf::from(DEFAULT_CONFIG_NAME), false),
            },
        };
        if !path.exists() {
            if explicit {
                return Err(ConfigError::Io(format!("config file not found: {}", path.display())));
            }
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let metadata = fs::metadata(&path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if size > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                max: MAX_CONFIG_FILE_SIZE,
                actual: size,
            });
        }
        let raw = fs::read_to_string(&path).map_err(|err| ConfigError::Io(err.to_string()))?;
        Self::parse(&raw)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints, failing closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.workers == 0 || self.pipeline.workers > MAX_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "pipeline.workers must be between 1 and {MAX_WORKERS}"
            )));
        }
        if self.pipeline.queue_capacity == 0 || self.pipeline.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "pipeline.queue_capacity must be between 1 and {MAX_QUEUE_CAPACITY}"
            )));
        }
        for (name, ttl) in [
            ("locks.profile_ttl_ms", self.locks.profile_ttl_ms),
            ("locks.unify_ttl_ms", self.locks.unify_ttl_ms),
        ] {
            if !(MIN_LOCK_TTL_MS..=MAX_LOCK_TTL_MS).contains(&ttl) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between {MIN_LOCK_TTL_MS} and {MAX_LOCK_TTL_MS}"
                )));
            }
        }
        if self.locks.max_attempts == 0 {
            return Err(ConfigError::Invalid("locks.max_attempts must be at least 1".to_string()));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.path.is_none() {
            return Err(ConfigError::Invalid(
                "store.path is required for the sqlite backend".to_string(),
            ));
        }
        Ok(())
    }
}
