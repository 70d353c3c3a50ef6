//! Backup engine
//!
//! Mirrors a local directory tree into a bucket. A run:
//!
//! 1. Makes sure the bucket exists (fatal if it cannot be created)
//! 2. Lists every regular file under the root
//! 3. Hands the files to a bounded worker pool; each worker hashes its file,
//!    compares against the checksum stored on the remote object and uploads
//!    only on mismatch
//! 4. Returns a [`RunSummary`] with counters and the per-file failures
//!
//! A file that fails does not stop the run. The caller decides what a
//! non-empty failure list means (the CLI exits non-zero).
//!
//! # Example
//!
//! ```no_run
//! use mizuchi_backup::backup::Backup;
//! use mizuchi_backup::config::Config;
//! use mizuchi_backup::s3::{Credentials, S3Store};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("backup.yaml")?;
//! let store = S3Store::connect(&config.s3, "backups", Credentials::new("key", "secret")).await?;
//!
//! let summary = Backup::new("/srv/data", Arc::new(store), &config).run().await?;
//! println!("{} uploaded, {} skipped", summary.files_uploaded, summary.files_skipped);
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod compress;
pub mod decision;
pub mod dispatch;
pub mod progress;
pub mod retry;
pub mod task;
pub mod walk;

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::metrics;
use crate::s3::{ObjectStore, StoreError};
use dispatch::run_all;
use progress::{readable_bytes, ProgressReporter, RunStats};
use retry::RetryPolicy;
use task::Uploader;
use walk::{list_files, FileEntry};

pub use checksum::ContentDigest;
pub use task::UploadOutcome;

/// Backup errors
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Failed to read {}: {}", .path.display(), .source)]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to list {}: {}", .root.display(), .source)]
    Listing {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Worker task failed: {0}")]
    Task(String),
}

impl BackupError {
    /// Short label for the errors metric
    pub fn kind(&self) -> &'static str {
        match self {
            BackupError::LocalIo { .. } => "local_io",
            BackupError::Listing { .. } => "listing",
            BackupError::Store(StoreError::Transient(_)) => "store_transient",
            BackupError::Store(StoreError::BucketCreate { .. }) => "bucket",
            BackupError::Store(_) => "store_rejected",
            BackupError::Task(_) => "task",
        }
    }
}

/// A file that could not be backed up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Final counters of a run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub total_files: u64,
    pub files_uploaded: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    /// Local bytes of every file that finished
    pub bytes_done: u64,
    /// Bytes sent after compression
    pub bytes_transferred: u64,
    pub elapsed: Duration,
    pub failures: Vec<FileFailure>,
}

impl RunSummary {
    /// True when every file was uploaded or skipped
    pub fn is_success(&self) -> bool {
        self.files_failed == 0
    }
}

/// One backup of a directory tree into one bucket
pub struct Backup {
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
    uploader: Uploader,
    workers: usize,
}

impl Backup {
    pub fn new(root: impl Into<PathBuf>, store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        let uploader = Uploader::new(Arc::clone(&store), &config.backup, &config.retry);
        Self {
            root: root.into(),
            store,
            uploader,
            workers: config.backup.workers,
        }
    }

    /// Replace the retry policy used for object store calls
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.uploader = self.uploader.with_retry_policy(retry);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run the backup to completion
    ///
    /// Returns an error only when the run cannot start: the bucket is
    /// unusable or the root cannot be listed. Per-file problems are reported
    /// in the summary.
    pub async fn run(&self) -> Result<RunSummary, BackupError> {
        if let Err(e) = self.store.ensure_bucket().await {
            metrics::record_error("bucket");
            return Err(e.into());
        }

        let files = self.list().await?;
        tracing::info!(
            root = %self.root.display(),
            files = files.len(),
            workers = self.workers,
            "Starting backup"
        );

        let stats = Arc::new(RunStats::new(files.len() as u64));
        let reporter = ProgressReporter::new(Arc::clone(&stats));
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();

        let uploader = self.uploader.clone();
        let worker_reporter = reporter.clone();
        let report = run_all(files, self.workers, move |entry: FileEntry| {
            let uploader = uploader.clone();
            let reporter = worker_reporter.clone();
            async move {
                match uploader.process(&entry).await {
                    Ok(outcome) => {
                        reporter.report(&entry.path, &outcome);
                        (entry.path, None)
                    }
                    Err(e) => {
                        metrics::record_error(e.kind());
                        reporter.report_failure(&entry.path, &e);
                        (entry.path, Some(e.to_string()))
                    }
                }
            }
        })
        .await;

        let mut finished = HashSet::with_capacity(report.outputs.len());
        let mut failures = Vec::new();
        for (path, error) in report.outputs {
            if let Some(error) = error {
                failures.push(FileFailure {
                    path: path.clone(),
                    error,
                });
            }
            finished.insert(path);
        }

        // Files whose task panicked never reported back
        for path in paths.into_iter().filter(|p| !finished.contains(p)) {
            let error = "worker panicked".to_string();
            metrics::record_error("task");
            reporter.report_failure(&path, &error);
            failures.push(FileFailure { path, error });
        }
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        let snapshot = stats.snapshot();
        let summary = RunSummary {
            started_at: stats.started_at(),
            total_files: snapshot.total_files,
            files_uploaded: snapshot.counters.files_uploaded,
            files_skipped: snapshot.counters.files_skipped,
            files_failed: snapshot.counters.files_failed,
            bytes_done: snapshot.counters.bytes_done,
            bytes_transferred: snapshot.counters.bytes_transferred,
            elapsed: snapshot.elapsed,
            failures,
        };

        tracing::info!(
            total = summary.total_files,
            uploaded = summary.files_uploaded,
            skipped = summary.files_skipped,
            failed = summary.files_failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Backup finished: {} scanned, {} transferred",
            readable_bytes(summary.bytes_done),
            readable_bytes(summary.bytes_transferred)
        );

        Ok(summary)
    }

    async fn list(&self) -> Result<Vec<FileEntry>, BackupError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_files(&root))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))?
            .map_err(|source| {
                metrics::record_error("listing");
                BackupError::Listing {
                    root: self.root.clone(),
                    source,
                }
            })
    }
}
