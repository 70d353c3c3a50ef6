//! Compression policy and payload preparation
//!
//! Files are gzipped before upload unless their extension marks them as
//! already compressed. Small files are compressed into memory; anything above
//! the threshold is compressed into a temporary file so peak memory stays
//! bounded no matter how large the source is.
//!
//! # Flow
//!
//! 1. [`CompressionPolicy::should_compress`] decides from the extension
//! 2. [`CompressionPolicy::strategy`] picks memory or temp file from the size
//! 3. [`CompressionPolicy::prepare`] produces a [`Payload`] ready for upload
//!
//! Spilled payloads own their temp file through [`SpilledGzip`], which
//! removes it when dropped, whether the upload succeeded or not.

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::checksum::ContentDigest;
use crate::config::BackupConfig;
use crate::s3::ObjectBody;

/// Where a compressed payload is staged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionStrategy {
    InMemory,
    SpillToTemp,
}

impl CompressionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionStrategy::InMemory => "memory",
            CompressionStrategy::SpillToTemp => "temp_file",
        }
    }
}

/// Decides whether and how a file is compressed before upload
#[derive(Debug, Clone)]
pub struct CompressionPolicy {
    skip_extensions: Vec<String>,
    in_memory_threshold: u64,
    level: u32,
    temp_dir: PathBuf,
}

impl CompressionPolicy {
    pub fn new(config: &BackupConfig) -> Self {
        Self {
            skip_extensions: config
                .skip_compression_extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
            in_memory_threshold: config.compression_threshold,
            level: config.gzip_level,
            temp_dir: config
                .temp_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }

    /// True unless the file's extension is in the pre-compressed set.
    /// Extensions compare case-insensitively.
    pub fn should_compress(&self, path: &Path) -> bool {
        match path.extension() {
            Some(ext) => {
                let ext = normalize_extension(&ext.to_string_lossy());
                !self.skip_extensions.contains(&ext)
            }
            None => true,
        }
    }

    /// Files at or below the threshold are compressed in memory
    pub fn strategy(&self, size: u64) -> CompressionStrategy {
        if size <= self.in_memory_threshold {
            CompressionStrategy::InMemory
        } else {
            CompressionStrategy::SpillToTemp
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Stage `path` for upload
    ///
    /// Blocking: run it on a blocking thread from async code.
    pub fn prepare(
        &self,
        path: &Path,
        size: u64,
        compress: bool,
        digest: &ContentDigest,
    ) -> io::Result<Payload> {
        if !compress {
            return Ok(Payload::Raw {
                path: path.to_path_buf(),
                len: size,
            });
        }

        match self.strategy(size) {
            CompressionStrategy::InMemory => {
                let mut source = File::open(path)?;
                let mut encoder = GzEncoder::new(
                    Vec::with_capacity(size as usize / 2 + 64),
                    Compression::new(self.level),
                );
                io::copy(&mut source, &mut encoder)?;
                Ok(Payload::Memory(Bytes::from(encoder.finish()?)))
            }
            CompressionStrategy::SpillToTemp => {
                let spilled = SpilledGzip::create(&self.temp_dir, digest, path, self.level)?;
                Ok(Payload::Spilled(spilled))
            }
        }
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Upload-ready content for one file
#[derive(Debug)]
pub enum Payload {
    /// Uncompressed, streamed straight from the source file
    Raw { path: PathBuf, len: u64 },
    /// Gzipped into memory
    Memory(Bytes),
    /// Gzipped into a temporary file
    Spilled(SpilledGzip),
}

impl Payload {
    /// Body for an object store write. Cheap to call repeatedly, so a retry
    /// can resend the same payload.
    pub fn body(&self) -> ObjectBody {
        match self {
            Payload::Raw { path, .. } => ObjectBody::File(path.clone()),
            Payload::Memory(bytes) => ObjectBody::Bytes(bytes.clone()),
            Payload::Spilled(spilled) => ObjectBody::File(spilled.path().to_path_buf()),
        }
    }

    /// Number of bytes that will be sent
    pub fn len(&self) -> u64 {
        match self {
            Payload::Raw { len, .. } => *len,
            Payload::Memory(bytes) => bytes.len() as u64,
            Payload::Spilled(spilled) => spilled.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Raw { .. } => "raw",
            Payload::Memory(_) => CompressionStrategy::InMemory.as_str(),
            Payload::Spilled(_) => CompressionStrategy::SpillToTemp.as_str(),
        }
    }
}

/// Gzipped copy of a large file in a uniquely named temp file
///
/// Automatically removed when dropped (RAII pattern). The name combines a
/// random token with the content digest, so concurrent workers never collide
/// even when they compress identical content.
#[derive(Debug)]
pub struct SpilledGzip {
    path: PathBuf,
    size: u64,
}

impl SpilledGzip {
    fn create(dir: &Path, digest: &ContentDigest, source: &Path, level: u32) -> io::Result<Self> {
        let file_name = format!("{}-{}.gz", uuid::Uuid::new_v4().simple(), digest);
        let path = dir.join(file_name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        // Own the path before writing so a failed compression still cleans up.
        let mut spilled = Self { path, size: 0 };
        tracing::debug!(
            source = %source.display(),
            temp = %spilled.path.display(),
            "Compressing large file to temp file"
        );

        let mut input = File::open(source)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::new(level));
        io::copy(&mut input, &mut encoder)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        drop(writer);

        spilled.size = std::fs::metadata(&spilled.path)?.len();
        Ok(spilled)
    }

    /// Get the path to the temp file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compressed size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for SpilledGzip {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to clean up temp file"
                );
            }
        }
    }
}
