//! Content checksums used for change detection
//!
//! MD5 is used purely as a fingerprint: the digest decides whether a file
//! needs to be re-uploaded and is never relied on for integrity or security.

use md5::{Digest, Md5};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Default read size for hashing
pub const DEFAULT_BLOCK_SIZE: usize = 65536; // 64KB

/// Hex-encoded MD5 digest of a file's content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Digest of an in-memory buffer
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(hex::encode(Md5::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hash a file by streaming it in `block_size` reads
///
/// The digest depends only on the bytes read, never on the block size. A
/// file that disappears or becomes unreadable mid-read surfaces as an
/// [`io::Error`].
pub fn checksum_file(path: &Path, block_size: usize) -> io::Result<ContentDigest> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; block_size.max(1)];

    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..read]);
    }

    Ok(ContentDigest(hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_known_digest() {
        let file = file_with(b"hello");
        let digest = checksum_file(file.path(), DEFAULT_BLOCK_SIZE).unwrap();
        assert_eq!(digest.as_str(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_empty_file() {
        let file = file_with(b"");
        let digest = checksum_file(file.path(), DEFAULT_BLOCK_SIZE).unwrap();
        assert_eq!(digest.as_str(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_block_size_does_not_change_digest() {
        let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let file = file_with(&content);

        let expected = ContentDigest::of_bytes(&content);
        for block_size in [1, 7, 4096, 65536, 1 << 20] {
            assert_eq!(checksum_file(file.path(), block_size).unwrap(), expected);
        }
    }

    #[test]
    fn test_stable_and_sensitive_to_single_byte() {
        let file = file_with(b"backup me");
        let first = checksum_file(file.path(), 4096).unwrap();
        let second = checksum_file(file.path(), 4096).unwrap();
        assert_eq!(first, second);

        std::fs::write(file.path(), b"backup mf").unwrap();
        let changed = checksum_file(file.path(), 4096).unwrap();
        assert_ne!(first, changed);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = checksum_file(&dir.path().join("gone.txt"), 4096).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
