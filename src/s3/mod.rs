//! Object store module
//!
//! Defines the [`ObjectStore`] seam the backup engine talks to and the
//! aws-sdk-s3 backed implementation, [`S3Store`].
//!
//! The engine only needs four things from a bucket: make sure it exists,
//! read an object's user metadata, and write an object (from memory or from a
//! file) together with its metadata in a single request. Writing content and
//! metadata together means a later run never sees new content paired with a
//! stale checksum.
//!
//! # Example
//!
//! ```no_run
//! use mizuchi_backup::config::S3Config;
//! use mizuchi_backup::s3::{Credentials, ObjectStore, S3Store};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = S3Config {
//!     bucket: Some("backups".into()),
//!     ..Default::default()
//! };
//! let store = S3Store::connect(&config, "backups", Credentials::new("key", "secret")).await?;
//! store.ensure_bucket().await?;
//!
//! if let Some(head) = store.head_object("docs/report.txt.gz").await? {
//!     println!("checksum: {:?}", head.metadata("checksum"));
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::backup::retry::Retryable;

pub mod client;
pub mod credentials;

pub use client::S3Store;
pub use credentials::{Credentials, CredentialsError, CredentialsProvider};

/// Object store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Timeouts, connection failures, throttling and server-side errors
    #[error("Transient S3 error: {0}")]
    Transient(String),

    /// The service understood the request and refused it
    #[error("S3 request rejected: {0}")]
    Rejected(String),

    #[error("Could not create bucket {bucket}: {reason}")]
    BucketCreate { bucket: String, reason: String },

    /// The local source of an upload could not be read
    #[error("Failed to read upload source: {0}")]
    LocalFile(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Metadata of an existing remote object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    pub metadata: HashMap<String, String>,
    pub content_length: Option<u64>,
}

impl ObjectHead {
    /// Look up a user metadata value. S3 lower-cases metadata keys, so the
    /// lookup is case-insensitive.
    pub fn metadata(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Content of an object write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBody {
    /// In-memory payload
    Bytes(Bytes),
    /// Payload streamed from a local file
    File(PathBuf),
}

/// Remote key-to-blob storage scoped to a single bucket
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Make sure the bucket exists, creating it when missing.
    ///
    /// Fails with [`StoreError::BucketCreate`] if creation is refused.
    async fn ensure_bucket(&self) -> Result<(), StoreError>;

    /// Fetch an object's metadata, or `None` if the object does not exist
    async fn head_object(&self, key: &str) -> Result<Option<ObjectHead>, StoreError>;

    /// Write content and user metadata in one request, replacing any
    /// existing object under `key`
    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        metadata: HashMap<String, String>,
    ) -> Result<(), StoreError>;
}
