//! Shared test infrastructure
//!
//! [`MemoryStore`] is an in-process [`ObjectStore`] that records every call
//! and can be told to fail specific keys, so backup runs can be exercised
//! end to end without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use mizuchi_backup::s3::{ObjectBody, ObjectHead, ObjectStore, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

/// Object stored in a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content: Vec<u8>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    bucket_exists: bool,
    objects: HashMap<String, StoredObject>,
    heads: Vec<String>,
    puts: Vec<String>,
    /// Remaining transient failures per key for PutObject
    transient_puts: HashMap<String, u32>,
    /// Keys whose PutObject is always rejected
    rejected_puts: Vec<String>,
    /// Temp files seen as upload sources
    spilled_sources: Vec<std::path::PathBuf>,
}

/// In-memory bucket
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    refuse_bucket: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose bucket can never be created
    pub fn refusing_bucket() -> Self {
        Self {
            refuse_bucket: true,
            ..Self::default()
        }
    }

    /// Fail the next `times` PutObject calls for `key` with a transient error
    pub fn fail_put_transiently(&self, key: &str, times: u32) {
        self.state
            .lock()
            .transient_puts
            .insert(key.to_string(), times);
    }

    /// Reject every PutObject for `key`
    pub fn reject_put(&self, key: &str) {
        self.state.lock().rejected_puts.push(key.to_string());
    }

    /// Seed an object as if a previous run had uploaded it
    pub fn insert(&self, key: &str, content: &[u8], metadata: &[(&str, &str)]) {
        self.state.lock().objects.insert(
            key.to_string(),
            StoredObject {
                content: content.to_vec(),
                metadata: metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.state.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn head_calls(&self) -> Vec<String> {
        self.state.lock().heads.clone()
    }

    /// Keys passed to PutObject, including failed attempts
    pub fn put_calls(&self) -> Vec<String> {
        self.state.lock().puts.clone()
    }

    pub fn bucket_exists(&self) -> bool {
        self.state.lock().bucket_exists
    }

    /// Temp file paths that were used as PutObject bodies
    pub fn spilled_sources(&self) -> Vec<std::path::PathBuf> {
        self.state.lock().spilled_sources.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn ensure_bucket(&self) -> Result<(), StoreError> {
        if self.refuse_bucket {
            return Err(StoreError::BucketCreate {
                bucket: "test-bucket".into(),
                reason: "BucketAlreadyExists".into(),
            });
        }
        self.state.lock().bucket_exists = true;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        let mut state = self.state.lock();
        state.heads.push(key.to_string());
        Ok(state.objects.get(key).map(|object| ObjectHead {
            metadata: object.metadata.clone(),
            content_length: Some(object.content.len() as u64),
        }))
    }

    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        metadata: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let content = match body {
            ObjectBody::Bytes(ref bytes) => bytes.to_vec(),
            ObjectBody::File(ref path) => read_source(path)?,
        };

        let mut state = self.state.lock();
        state.puts.push(key.to_string());
        if let ObjectBody::File(path) = body {
            if path.extension().is_some_and(|ext| ext == "gz") {
                state.spilled_sources.push(path);
            }
        }

        if state.rejected_puts.iter().any(|k| k == key) {
            return Err(StoreError::Rejected(format!("AccessDenied: {}", key)));
        }
        if let Some(remaining) = state.transient_puts.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Transient("SlowDown".into()));
            }
        }

        state
            .objects
            .insert(key.to_string(), StoredObject { content, metadata });
        Ok(())
    }
}

fn read_source(path: &Path) -> Result<Vec<u8>, StoreError> {
    std::fs::read(path).map_err(|e| StoreError::LocalFile(format!("{}: {}", path.display(), e)))
}

/// Decompress a gzip payload
pub fn gunzip(data: &[u8]) -> Vec<u8> {
    use std::io::Read;
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(data)
        .read_to_end(&mut out)
        .expect("valid gzip");
    out
}

/// MD5 hex digest, as stored in object metadata
pub fn md5_hex(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    hex::encode(Md5::digest(data))
}
