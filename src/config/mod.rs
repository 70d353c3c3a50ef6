//! Configuration module for Mizuchi Backup
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Every section has defaults,
//! so a missing or empty file yields a usable configuration; CLI flags are
//! layered on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref bucket) = self.s3.bucket {
            if bucket.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Bucket name cannot be empty".into(),
                ));
            }
        }

        if self.backup.workers == 0 {
            return Err(ConfigError::ValidationError(
                "backup.workers must be at least 1".into(),
            ));
        }

        if self.backup.checksum_block_size == 0 {
            return Err(ConfigError::ValidationError(
                "backup.checksum_block_size must be greater than 0".into(),
            ));
        }

        if self.backup.gzip_level > 9 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid gzip level {}: must be between 0 and 9",
                self.backup.gzip_level
            )));
        }

        if self.backup.checksum_metadata_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backup.checksum_metadata_key cannot be empty".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if !(self.retry.backoff_multiplier >= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid backoff multiplier {}: must be >= 1.0",
                self.retry.backoff_multiplier
            )));
        }

        Ok(())
    }
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: None,
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

/// Backup behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Number of files processed concurrently. Default: 8
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Files at or below this size are gzipped in memory; larger files are
    /// gzipped to a temporary file. Default: 1 MiB
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: u64,

    /// Read size used when hashing files. Default: 64 KiB
    #[serde(default = "default_checksum_block_size")]
    pub checksum_block_size: usize,

    /// Gzip compression level (0-9). Default: 6
    #[serde(default = "default_gzip_level")]
    pub gzip_level: u32,

    /// Extensions that are uploaded as-is because they are already compressed
    #[serde(default = "default_skip_compression_extensions")]
    pub skip_compression_extensions: Vec<String>,

    /// Directory for large-file gzip spills. Default: system temp dir
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// User metadata key holding the content checksum on each object.
    /// Use `meta-checksum` for archives written by older backup scripts,
    /// together with `key_prefix`.
    #[serde(default = "default_checksum_metadata_key")]
    pub checksum_metadata_key: String,

    /// Prepended to every key as `prefix/relative/path`. Empty by default,
    /// which keys objects by their path below the root. Older backup scripts
    /// keyed objects by the root exactly as it was typed (`data`,
    /// `/srv/data`); setting the prefix to that string reuses their objects.
    /// Also keeps several roots apart in one bucket.
    #[serde(default)]
    pub key_prefix: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            compression_threshold: default_compression_threshold(),
            checksum_block_size: default_checksum_block_size(),
            gzip_level: default_gzip_level(),
            skip_compression_extensions: default_skip_compression_extensions(),
            temp_dir: None,
            checksum_metadata_key: default_checksum_metadata_key(),
            key_prefix: String::new(),
        }
    }
}

fn default_workers() -> usize {
    8
}

fn default_compression_threshold() -> u64 {
    1048576 // 1MB
}

fn default_checksum_block_size() -> usize {
    65536 // 64KB
}

fn default_gzip_level() -> u32 {
    6
}

fn default_skip_compression_extensions() -> Vec<String> {
    vec![".zip".into(), ".gzip".into(), ".tgz".into()]
}

fn default_checksum_metadata_key() -> String {
    "checksum".to_string()
}

/// Retry configuration for object store calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one. Default: 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt. Default: 3000ms
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Factor applied to the delay after each failed attempt. Default: 2.0
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    3000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Write a Prometheus text exposition file here when the run ends
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}
