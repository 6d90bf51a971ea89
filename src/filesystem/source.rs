use std::fmt;
use std::fs::{File, Metadata};
use std::io::{self, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::ext::BestEffortPathExt;
use crate::filesystem::FileStream;

/// Where a file node's bytes come from.
///
/// A node without a source is a directory.
pub trait ByteSource: Send + Sync + fmt::Debug {
    fn open(&self) -> io::Result<FileStream>;

    /// Length known without reading the content, if any.
    fn len_hint(&self) -> Option<u64> {
        None
    }

    fn last_modified(&self) -> Option<SystemTime> {
        None
    }
}

/// Content held entirely in memory.
#[derive(Clone)]
pub struct MemorySource {
    bytes: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            bytes: Arc::from(bytes),
        }
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ByteSource for MemorySource {
    fn open(&self) -> io::Result<FileStream> {
        Ok(Box::new(Cursor::new(self.bytes.clone())))
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }
}

/// A regular file on the local disk, opened fresh on every read.
#[derive(Debug, Clone)]
pub struct DiskSource {
    path: PathBuf,
    len: Option<u64>,
    modified: Option<SystemTime>,
}

impl DiskSource {
    pub fn new(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        Self {
            path: path.into(),
            len: Some(metadata.len()),
            modified: metadata.modified().ok(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for DiskSource {
    fn open(&self) -> io::Result<FileStream> {
        let file = File::open(&self.path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("{}: {}", self.path.best_effort_path_display(), e),
            )
        })?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn len_hint(&self) -> Option<u64> {
        self.len
    }

    fn last_modified(&self) -> Option<SystemTime> {
        self.modified
    }
}
