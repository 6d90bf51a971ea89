use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use derive_more::Display;
use tracing::warn;

use crate::filesystem::checksum::ContentChecksum;
use crate::filesystem::path;
use crate::filesystem::{FileChangeListener, Node, TreeError};

/// Separator between names in a tree path.
pub const SEPARATOR: char = '/';

/// Shared handle to anything implementing the node contract.
pub type FileRef = Arc<dyn VirtualFile>;

/// A readable byte stream handed out by [`VirtualFile::open_stream`].
pub type FileStream = Box<dyn Read + Send>;

/// Stable identity of a node for the lifetime of the process.
///
/// Decorators report the id of the node they wrap, so two handles compare
/// equal by id whenever they point at the same underlying entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("#{_0}")]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The capability set every entity in the virtual tree exposes.
///
/// Protocol front-ends only ever talk to this trait, so a disk-backed node, a
/// synthesized node and a decorated node are indistinguishable to them.
/// Lookups that miss return `None`; structural mutators a backing store does
/// not support return `false`.
pub trait VirtualFile: Send + Sync + fmt::Debug {
    fn id(&self) -> NodeId;

    /// The name without any separator.
    fn name(&self) -> &str;

    fn parent(&self) -> Option<FileRef>;

    /// Looks up a child by literal name. `.` is the node itself and `..` its
    /// parent; a miss consults the missing-node resolvers.
    fn get(&self, name: &str) -> Option<FileRef>;

    /// Snapshot of the current children, ordered by name.
    fn list(&self) -> Vec<FileRef>;

    /// Opens the content for reading, or `None` for directories and sources
    /// that failed to open.
    fn open_stream(&self) -> Option<FileStream>;

    fn is_directory(&self) -> bool;

    fn is_file(&self) -> bool {
        !self.is_directory()
    }

    /// For a directory, the number of immediate children. For a file, the byte
    /// length, or `None` when it could not be determined.
    fn length(&self) -> Option<u64>;

    fn last_modified(&self) -> SystemTime;

    fn owner(&self) -> String;

    fn group(&self) -> String;

    fn add(&self, node: Arc<Node>) -> Result<(), TreeError>;

    fn add_all(&self, nodes: Vec<Arc<Node>>) -> Result<(), TreeError>;

    fn remove(&self, node: &dyn VirtualFile) -> Result<(), TreeError>;

    fn remove_all(&self, nodes: &[FileRef]) -> Result<(), TreeError>;

    fn add_listener(&self, listener: Arc<dyn FileChangeListener>);

    /// Resolves a separator-delimited path relative to this node.
    fn query(&self, path: &str) -> Option<FileRef> {
        path::resolve(self, path)
    }

    /// Every descendant whose name contains `pattern`, ignoring case.
    ///
    /// Depth first, pre-order; directories are descended into whether or not
    /// they match.
    fn find(&self, pattern: &str) -> Vec<FileRef> {
        let needle = pattern.to_lowercase();
        let mut found = Vec::new();
        let mut pending: Vec<FileRef> = self.list().into_iter().rev().collect();
        while let Some(entry) = pending.pop() {
            if entry.name().to_lowercase().contains(&needle) {
                found.push(entry.clone());
            }
            if entry.is_directory() {
                pending.extend(entry.list().into_iter().rev());
            }
        }
        found
    }

    /// Path from the root of the tree, always starting with [`SEPARATOR`].
    fn path(&self) -> String {
        match self.parent() {
            None => SEPARATOR.to_string(),
            Some(parent) => {
                let mut path = parent.path();
                if !path.ends_with(SEPARATOR) {
                    path.push(SEPARATOR);
                }
                path.push_str(self.name());
                path
            }
        }
    }

    fn checksum(&self) -> Option<ContentChecksum> {
        let stream = self.open_stream()?;
        match ContentChecksum::from_reader(stream) {
            Ok(checksum) => Some(checksum),
            Err(e) => {
                warn!("Failed to checksum '{}': {}", self.name(), e);
                None
            }
        }
    }

    fn exists(&self) -> bool {
        true
    }

    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        false
    }

    fn can_execute(&self) -> bool {
        false
    }

    fn create_new_file(&self) -> bool {
        false
    }

    fn delete(&self) -> bool {
        false
    }

    fn rename_to(&self, _name: &str) -> bool {
        false
    }

    fn set_executable(&self, _executable: bool) -> bool {
        false
    }

    fn set_readable(&self, _readable: bool) -> bool {
        false
    }

    fn set_writable(&self, _writable: bool) -> bool {
        false
    }

    fn set_last_modified(&self, _time: SystemTime) -> bool {
        false
    }
}

/// User name reported as owner and group when a backing store has none.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "nobody".to_string())
}
