use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::filesystem::{Node, TreeError, VirtualFile};

/// Unions independently discovered subtrees into a live tree.
///
/// All merges through one `Merger` are serialized, so concurrent unions into
/// overlapping directories cannot race. One instance is shared by every task
/// of an ingestion pass.
#[derive(Debug, Default)]
pub struct Merger {
    lock: Mutex<()>,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges every child of `source` into `parent`.
    pub fn merge(&self, source: &Arc<Node>, parent: &Arc<Node>) -> Result<(), TreeError> {
        let _guard = self.lock.lock();
        for child in source.children() {
            merge_node(child, parent)?;
        }
        Ok(())
    }

    /// Merges `node` itself into `parent`.
    pub fn merge_node(&self, node: Arc<Node>, parent: &Arc<Node>) -> Result<(), TreeError> {
        let _guard = self.lock.lock();
        merge_node(node, parent)
    }

    /// Attaches a node read from the primary source. It always takes the
    /// name; when both it and the current holder are directories, the
    /// holder's children move over to it first.
    pub fn attach(&self, node: Arc<Node>, parent: &Arc<Node>) -> Result<(), TreeError> {
        let _guard = self.lock.lock();
        if let Some(existing) = parent.child(node.name()) {
            if existing.is_directory() && node.is_directory() && !Arc::ptr_eq(&existing, &node) {
                node.add_all(existing.children())?;
            }
        }
        parent.add(node)
    }
}

/// Attaches `node` if `parent` has nothing by that name, otherwise unions
/// its children into the existing directory. Lookups are literal so merges
/// never land on synthesized nodes.
fn merge_node(node: Arc<Node>, parent: &Arc<Node>) -> Result<(), TreeError> {
    match parent.child(node.name()) {
        None => parent.add(node),
        Some(existing) if existing.is_directory() && node.is_directory() => {
            for child in node.children() {
                merge_node(child, &existing)?;
            }
            Ok(())
        }
        Some(existing) => {
            debug!(
                "Keeping existing '{}', dropping the merged duplicate",
                existing.path()
            );
            Ok(())
        }
    }
}
