//! Storage sink abstraction and the file-backed implementation.
//!
//! A [`Storage`] opens one [`StorageSink`] per attempt. The sink receives
//! whole buffers from [`WriteBuffer`](super::WriteBuffer), reports how many
//! bytes it actually wrote, and answers free-space queries for the medium
//! it lives on.
//!
//! [`FileStorage`] measures free space in one of two ways:
//! - the real filesystem containing the destination (`statvfs`)
//! - an emulated fixed-size partition, where `used` is the total size of the
//!   files under the partition root (small flash partitions report space
//!   this way)

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

/// Capacity snapshot of a storage medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceInfo {
    /// Total bytes on the medium.
    pub total: u64,
    /// Bytes currently in use.
    pub used: u64,
}

impl SpaceInfo {
    /// Bytes still available for writing.
    #[must_use]
    pub fn free(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }
}

/// Destination handle for one attempt.
pub trait StorageSink {
    /// Writes `bytes` in one call and returns how many were written.
    ///
    /// A return value smaller than `bytes.len()` is a short write; callers
    /// treat it as a storage failure rather than looping.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Reports total/used space for the medium holding this sink.
    fn space(&self) -> io::Result<SpaceInfo>;

    /// Flushes and releases the handle.
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}

/// Opens sinks for destination paths.
pub trait Storage {
    /// Sink type produced by [`open_truncate`](Self::open_truncate).
    type Sink: StorageSink;

    /// Removes any existing file at `path`, then opens a fresh, empty sink.
    fn open_truncate(&self, path: &Path) -> io::Result<Self::Sink>;
}

/// How free space is measured for file sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SpaceSource {
    /// Query the filesystem containing this directory.
    Filesystem(PathBuf),
    /// Fixed-size partition rooted at a directory.
    Partition { root: PathBuf, total: u64 },
}

/// [`Storage`] backed by the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileStorage {
    partition_size: Option<u64>,
}

impl FileStorage {
    /// Storage that reports the real filesystem's free space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that behaves like a partition of `total` bytes rooted at the
    /// destination file's parent directory.
    #[must_use]
    pub fn with_partition_size(total: u64) -> Self {
        Self {
            partition_size: Some(total),
        }
    }
}

impl Storage for FileStorage {
    type Sink = FileSink;

    fn open_truncate(&self, path: &Path) -> io::Result<FileSink> {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale destination file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let file = File::create(path)?;
        let parent = parent_dir(path);
        let space = match self.partition_size {
            Some(total) => SpaceSource::Partition {
                root: parent,
                total,
            },
            None => SpaceSource::Filesystem(parent),
        };
        Ok(FileSink { file, space })
    }
}

/// Sink writing to a local file.
#[derive(Debug)]
pub struct FileSink {
    file: File,
    space: SpaceSource,
}

impl StorageSink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        // Like `write_all`, but a failure after partial progress reports the
        // partial count instead of an error.
        let mut written = 0;
        while written < bytes.len() {
            match self.file.write(&bytes[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if written > 0 => {
                    trace!(error = %e, written, "write stopped early");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    fn space(&self) -> io::Result<SpaceInfo> {
        match &self.space {
            SpaceSource::Filesystem(dir) => filesystem_space(dir),
            SpaceSource::Partition { root, total } => Ok(SpaceInfo {
                total: *total,
                used: directory_usage(root)?,
            }),
        }
    }

    fn close(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Sum of regular file sizes under `root`, recursively.
fn directory_usage(root: &Path) -> io::Result<u64> {
    let mut used = 0u64;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            used = used.saturating_add(directory_usage(&entry.path())?);
        } else if file_type.is_file() {
            used = used.saturating_add(entry.metadata()?.len());
        }
    }
    Ok(used)
}

#[cfg(unix)]
fn filesystem_space(dir: &Path) -> io::Result<SpaceInfo> {
    let stat = nix::sys::statvfs::statvfs(dir).map_err(io::Error::from)?;
    let fragment = u64::from(stat.fragment_size());
    let total = u64::from(stat.blocks()).saturating_mul(fragment);
    let available = u64::from(stat.blocks_available()).saturating_mul(fragment);
    Ok(SpaceInfo {
        total,
        used: total.saturating_sub(available),
    })
}

#[cfg(not(unix))]
fn filesystem_space(_dir: &Path) -> io::Result<SpaceInfo> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "free space query is only available on unix targets",
    ))
}
