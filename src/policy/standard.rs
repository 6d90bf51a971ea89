use std::sync::Arc;

use tracing::warn;

use crate::filesystem::{AccessPolicy, FileRef, Node, TreeError, VirtualFile};

/// Access policy configured from the command line and config file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StandardPolicy {
    /// Rejects `add` and `add_all`. Removals and timestamp updates still go
    /// through to the inner node.
    pub read_only: bool,
    /// Hides names starting with `.` from `list` and `get`.
    pub hide_dotfiles: bool,
}

impl StandardPolicy {
    fn hides(&self, name: &str) -> bool {
        self.hide_dotfiles && name.starts_with('.') && name != "." && name != ".."
    }
}

impl AccessPolicy for StandardPolicy {
    fn list(&self, dir: &dyn VirtualFile) -> Vec<FileRef> {
        let mut listed = dir.list();
        if self.hide_dotfiles {
            listed.retain(|file| !self.hides(file.name()));
        }
        listed
    }

    fn get(&self, dir: &dyn VirtualFile, name: &str) -> Option<FileRef> {
        if self.hides(name) {
            return None;
        }
        dir.get(name)
    }

    fn add(&self, dir: &dyn VirtualFile, node: Arc<Node>) -> Result<(), TreeError> {
        if self.read_only {
            warn!("Rejected adding '{}' to '{}': read-only", node.name(), dir.path());
            return Err(TreeError::Denied {
                name: node.name().to_string(),
                reason: "the tree is read-only".to_string(),
            });
        }
        dir.add(node)
    }
}
