//! Mizuchi Backup Library
//!
//! Incremental, checksum-addressed backup of a directory tree to an
//! S3-compatible bucket.
//!
//! # Features
//!
//! - **Incremental**: files whose MD5 matches the checksum stored on the
//!   remote object are skipped without reading the remote content
//! - **Compression**: gzip before upload, in memory for small files and
//!   through a temp file for large ones; already-compressed formats are sent
//!   as-is
//! - **Bounded Concurrency**: a fixed pool of workers
//! - **Retries**: exponential backoff around transient S3 failures
//!
//! # Example
//!
//! ```no_run
//! use mizuchi_backup::{Backup, Config};
//! use mizuchi_backup::s3::{CredentialsProvider, S3Store};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("backup.yaml")?;
//!     let credentials = CredentialsProvider::from_env()?;
//!     let store = S3Store::connect(&config.s3, "backups", credentials).await?;
//!
//!     let summary = Backup::new("/srv/data", Arc::new(store), &config).run().await?;
//!     assert!(summary.is_success());
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod prompt;
pub mod s3;

// Re-export commonly used types
pub use backup::{Backup, BackupError, RunSummary};
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
