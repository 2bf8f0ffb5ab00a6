//! Filesystem layer: chunked file I/O, resume probing, and tree walking.
//!
//! Destination files are created lazily on first write. A write at offset 0
//! truncates; a write at any other offset opens the file read/write and
//! extends it in place. Partial transfers simply leave the file at its
//! last-written size, which is what a later resume probe reads back.

pub mod paths;

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// Filesystem errors, carrying the path they refer to.
#[derive(Debug, Error)]
pub enum FileError {
    /// Opening a file failed.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Path that failed to open.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Reading a chunk failed.
    #[error("failed to read {path} at offset {offset}: {source}")]
    Read {
        /// Path being read.
        path: String,
        /// Offset of the failed read.
        offset: u64,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a chunk failed.
    #[error("failed to write {path} at offset {offset}: {source}")]
    Write {
        /// Path being written.
        path: String,
        /// Offset of the failed write.
        offset: u64,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Creating a directory chain failed.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Reading file metadata failed.
    #[error("failed to stat {path}: {source}")]
    Metadata {
        /// Path being probed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Walking a directory tree failed.
    #[error("failed to walk {path}: {source}")]
    Walk {
        /// Tree root.
        path: String,
        /// Underlying error.
        #[source]
        source: walkdir::Error,
    },
}

/// One entry discovered while walking a source tree.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Absolute path of the entry.
    pub path: PathBuf,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// File size in bytes; 0 for directories.
    pub size: u64,
}

/// Size of the file, or an error if it cannot be probed.
pub fn file_size(path: &Path) -> Result<u64, FileError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| FileError::Metadata {
            path: path.display().to_string(),
            source,
        })
}

/// Current on-disk size of a possibly-partial file; 0 when absent.
pub fn partial_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Create the directory chain, succeeding if it already exists.
pub fn create_dir_all(path: &Path) -> Result<(), FileError> {
    fs::create_dir_all(path).map_err(|source| FileError::CreateDir {
        path: path.display().to_string(),
        source,
    })
}

/// Read up to `size` bytes at `offset`. Short when the file ends first.
pub fn read_chunk(path: &Path, offset: u64, size: usize) -> Result<Vec<u8>, FileError> {
    let mut file = File::open(path).map_err(|source| FileError::Open {
        path: path.display().to_string(),
        source,
    })?;

    file.seek(SeekFrom::Start(offset))
        .map_err(|source| FileError::Read {
            path: path.display().to_string(),
            offset,
            source,
        })?;

    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = file
            .read(&mut buf[filled..])
            .map_err(|source| FileError::Read {
                path: path.display().to_string(),
                offset,
                source,
            })?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Write `data` at `offset`, creating the file and its parent directories
/// as needed. Offset 0 truncates; any other offset extends in place.
pub fn write_chunk(path: &Path, offset: u64, data: &[u8]) -> Result<(), FileError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            create_dir_all(parent)?;
        }
    }

    let mut file = if offset == 0 {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    } else {
        OpenOptions::new().read(true).write(true).create(true).open(path)
    }
    .map_err(|source| FileError::Open {
        path: path.display().to_string(),
        source,
    })?;

    file.seek(SeekFrom::Start(offset))
        .map_err(|source| FileError::Write {
            path: path.display().to_string(),
            offset,
            source,
        })?;

    file.write_all(data).map_err(|source| FileError::Write {
        path: path.display().to_string(),
        offset,
        source,
    })
}

/// Enumerate a directory tree, the root excluded, files and directories
/// both included.
pub fn list_tree(root: &Path) -> Result<Vec<EntryInfo>, FileError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|source| FileError::Walk {
            path: root.display().to_string(),
            source,
        })?;

        let is_directory = entry.file_type().is_dir();
        let size = if is_directory {
            0
        } else {
            entry
                .metadata()
                .map(|m| m.len())
                .map_err(|source| FileError::Walk {
                    path: root.display().to_string(),
                    source,
                })?
        };

        entries.push(EntryInfo {
            path: entry.into_path(),
            is_directory,
            size,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunked.bin");

        write_chunk(&path, 0, b"hello world").unwrap();
        assert_eq!(read_chunk(&path, 0, 5).unwrap(), b"hello");
        assert_eq!(read_chunk(&path, 6, 100).unwrap(), b"world");
    }

    #[test]
    fn test_offset_zero_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bin");

        write_chunk(&path, 0, b"a much longer first version").unwrap();
        write_chunk(&path, 0, b"short").unwrap();
        assert_eq!(file_size(&path).unwrap(), 5);
    }

    #[test]
    fn test_nonzero_offset_extends_without_truncation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.bin");

        write_chunk(&path, 0, &[1, 2, 3, 4]).unwrap();
        write_chunk(&path, 4, &[5, 6]).unwrap();

        assert_eq!(read_chunk(&path, 0, 16).unwrap(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/c/deep.bin");

        write_chunk(&path, 0, b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_empty_write_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.bin");

        write_chunk(&path, 0, &[]).unwrap();
        assert!(path.exists());
        assert_eq!(file_size(&path).unwrap(), 0);
    }

    #[test]
    fn test_partial_size_of_missing_file() {
        let dir = tempdir().unwrap();
        assert_eq!(partial_size(&dir.path().join("nope.bin")), 0);
    }

    #[test]
    fn test_list_tree() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub/empty")).unwrap();
        fs::write(dir.path().join("top.txt"), b"12345").unwrap();
        fs::write(dir.path().join("sub/nested.txt"), b"abc").unwrap();

        let mut entries = list_tree(dir.path()).unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let names: Vec<_> = entries
            .iter()
            .map(|e| {
                e.path
                    .strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, ["sub", "sub/empty", "sub/nested.txt", "top.txt"]);

        let nested = entries
            .iter()
            .find(|e| e.path.ends_with("nested.txt"))
            .unwrap();
        assert!(!nested.is_directory);
        assert_eq!(nested.size, 3);
    }
}
