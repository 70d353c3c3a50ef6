//! Directory enumeration

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A regular file found under the backup root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute local path
    pub path: PathBuf,
    /// Path relative to the backup root, `/`-separated
    pub relative: String,
    /// Size in bytes at listing time
    pub size: u64,
}

impl FileEntry {
    /// Lower-cased extension including the dot, or empty
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default()
    }

    /// Destination key: `prefix/relative`, plus `.gz` when compressed
    ///
    /// The prefix is used verbatim apart from trailing slashes; an empty
    /// prefix gives the bare relative path.
    pub fn remote_key(&self, prefix: &str, compressed: bool) -> String {
        let prefix = prefix.trim_end_matches('/');
        let key = if prefix.is_empty() {
            self.relative.clone()
        } else {
            format!("{}/{}", prefix, self.relative)
        };

        if compressed {
            format!("{}.gz", key)
        } else {
            key
        }
    }
}

/// Recursively list regular files under `root`, sorted by path and without
/// duplicates
///
/// Symbolic links are not followed. Entries that cannot be read below the
/// root are logged and left out, as are files whose path is not valid UTF-8
/// (their key would not be unique); an unreadable root is an error.
pub fn list_files(root: &Path) -> io::Result<Vec<FileEntry>> {
    let root = root.canonicalize()?;
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut files = BTreeMap::new();
    for entry in WalkDir::new(&root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(err.into()),
            Err(err) => {
                tracing::warn!(error = %err, "Skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "Skipping file without metadata");
                continue;
            }
        };

        let Some(relative) = relative_key(&root, entry.path()) else {
            tracing::warn!(
                path = %entry.path().display(),
                "Skipping file whose name is not valid UTF-8"
            );
            continue;
        };
        files.insert(
            entry.path().to_path_buf(),
            FileEntry {
                path: entry.path().to_path_buf(),
                relative,
                size,
            },
        );
    }

    Ok(files.into_values().collect())
}

/// `/`-joined path below `root`, or `None` if any component is not UTF-8
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let parts = path
        .strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lists_nested_files_sorted() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("b/deep")).unwrap();
        std::fs::create_dir_all(root.path().join("a")).unwrap();
        std::fs::write(root.path().join("z.txt"), b"z").unwrap();
        std::fs::write(root.path().join("b/deep/c.log"), b"ccc").unwrap();
        std::fs::write(root.path().join("a/one.zip"), b"1").unwrap();

        let files = list_files(root.path()).unwrap();
        let keys: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();

        assert_eq!(keys, vec!["a/one.zip", "b/deep/c.log", "z.txt"]);
        assert!(files.iter().all(|f| f.path.is_absolute()));
        assert_eq!(files[1].size, 3);
        assert_eq!(files[0].extension(), ".zip");
    }

    #[test]
    fn test_empty_directory() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("empty")).unwrap();
        assert!(list_files(root.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_is_error() {
        let root = TempDir::new().unwrap();
        assert!(list_files(&root.path().join("nope")).is_err());
    }

    #[test]
    fn test_file_root_is_error() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(list_files(&file).is_err());
    }

    #[test]
    fn test_remote_key() {
        let entry = FileEntry {
            path: PathBuf::from("/data/docs/a.txt"),
            relative: "docs/a.txt".into(),
            size: 1,
        };
        assert_eq!(entry.remote_key("", true), "docs/a.txt.gz");
        assert_eq!(entry.remote_key("", false), "docs/a.txt");
        assert_eq!(entry.extension(), ".txt");
    }

    #[test]
    fn test_remote_key_with_prefix() {
        let entry = FileEntry {
            path: PathBuf::from("/srv/data/docs/a.txt"),
            relative: "docs/a.txt".into(),
            size: 1,
        };
        assert_eq!(entry.remote_key("data", true), "data/docs/a.txt.gz");
        assert_eq!(entry.remote_key("hosts/web1/", false), "hosts/web1/docs/a.txt");
        // Kept as typed, leading slash included
        assert_eq!(entry.remote_key("/srv/data", true), "/srv/data/docs/a.txt.gz");
        assert_eq!(entry.remote_key("/", false), "docs/a.txt");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join(OsStr::from_bytes(b"report\xff.txt")), b"a").unwrap();
        std::fs::write(root.path().join(OsStr::from_bytes(b"report\xfe.txt")), b"b").unwrap();
        std::fs::write(root.path().join("plain.txt"), b"c").unwrap();

        let files = list_files(root.path()).unwrap();
        let keys: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(keys, vec!["plain.txt"]);
    }
}
