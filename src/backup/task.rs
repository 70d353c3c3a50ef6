//! Per-file upload-or-skip
//!
//! [`Uploader::process`] hashes a file, asks the object store for the
//! checksum stored with the previous upload, and only sends content when the
//! two differ. Hashing and compression are local and deterministic, so they
//! run once on a blocking thread; the network calls go through the retry
//! policy.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::checksum::{checksum_file, ContentDigest};
use super::compress::{CompressionPolicy, Payload};
use super::decision::{decide, UploadDecision};
use super::retry::{retry_with_backoff, RetryPolicy};
use super::walk::FileEntry;
use super::BackupError;
use crate::config::{BackupConfig, RetryConfig};
use crate::metrics;
use crate::s3::ObjectStore;

/// Result of processing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Destination key
    pub key: String,
    pub checksum: ContentDigest,
    pub will_compress: bool,
    /// Size of the local file
    pub local_bytes: u64,
    /// Bytes sent to the store; zero when skipped
    pub transferred_bytes: u64,
    pub skipped: bool,
    /// Checksum found on the remote object before this run, if any
    pub remote_checksum: Option<String>,
}

/// Uploads single files to an object store
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    policy: Arc<CompressionPolicy>,
    retry: RetryPolicy,
    block_size: usize,
    metadata_key: String,
    key_prefix: String,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, backup: &BackupConfig, retry: &RetryConfig) -> Self {
        Self {
            store,
            policy: Arc::new(CompressionPolicy::new(backup)),
            retry: RetryPolicy::from_config(retry),
            block_size: backup.checksum_block_size,
            metadata_key: backup.checksum_metadata_key.clone(),
            key_prefix: backup.key_prefix.clone(),
        }
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn policy(&self) -> &CompressionPolicy {
        &self.policy
    }

    /// Upload `entry` unless the store already holds identical content
    #[tracing::instrument(
        name = "backup.process",
        skip(self, entry),
        fields(path = %entry.path.display(), size = entry.size)
    )]
    pub async fn process(&self, entry: &FileEntry) -> Result<UploadOutcome, BackupError> {
        let checksum = {
            let path = entry.path.clone();
            let block_size = self.block_size;
            tokio::task::spawn_blocking(move || checksum_file(&path, block_size))
                .await
                .map_err(|e| BackupError::Task(e.to_string()))?
                .map_err(|source| BackupError::LocalIo {
                    path: entry.path.clone(),
                    source,
                })?
        };

        let will_compress = self.policy.should_compress(&entry.path);
        let key = entry.remote_key(&self.key_prefix, will_compress);
        let store = self.store.as_ref();
        let key_ref = key.as_str();

        let head = retry_with_backoff(&self.retry, "HeadObject", || store.head_object(key_ref)).await?;
        let remote_checksum = head
            .as_ref()
            .and_then(|h| h.metadata(&self.metadata_key))
            .map(str::to_string);

        let mut outcome = UploadOutcome {
            key: key.clone(),
            checksum,
            will_compress,
            local_bytes: entry.size,
            transferred_bytes: 0,
            skipped: false,
            remote_checksum,
        };

        if decide(&outcome.checksum, outcome.remote_checksum.as_deref()) == UploadDecision::Skip {
            tracing::debug!(key = %key, "Remote checksum matches, skipping");
            outcome.skipped = true;
            return Ok(outcome);
        }

        let payload = self.prepare(entry, will_compress, &outcome.checksum).await?;
        let mut metadata = HashMap::new();
        metadata.insert(self.metadata_key.clone(), outcome.checksum.to_string());

        let started = Instant::now();
        retry_with_backoff(&self.retry, "PutObject", || {
            store.put_object(key_ref, payload.body(), metadata.clone())
        })
        .await?;
        metrics::record_upload_duration(payload.kind(), started.elapsed().as_secs_f64());

        outcome.transferred_bytes = payload.len();
        // Dropping the payload removes any spilled temp file.
        drop(payload);

        Ok(outcome)
    }

    async fn prepare(
        &self,
        entry: &FileEntry,
        compress: bool,
        checksum: &ContentDigest,
    ) -> Result<Payload, BackupError> {
        let policy = Arc::clone(&self.policy);
        let path: PathBuf = entry.path.clone();
        let size = entry.size;
        let checksum = checksum.clone();

        tokio::task::spawn_blocking(move || policy.prepare(&path, size, compress, &checksum))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))?
            .map_err(|source| BackupError::LocalIo {
                path: entry.path.clone(),
                source,
            })
    }
}
