use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, OnceLock, Weak};
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use snafu::Snafu;
use tracing::{debug, warn};

use crate::filesystem::contract::current_user;
use crate::filesystem::path::canonicalize;
use crate::filesystem::{
    ByteSource, FileChangeListener, FileRef, FileStream, MemorySource, NodeId, ResolverChain,
    SEPARATOR, VirtualFile,
};

/// Metadata a provider fixes when it creates a node.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub last_modified: SystemTime,
    pub owner: String,
    pub group: String,
    /// Whether `set_last_modified` may change `last_modified`.
    pub mutable: bool,
}

impl Default for Metadata {
    fn default() -> Self {
        let user = current_user();
        Self {
            last_modified: SystemTime::now(),
            owner: user.clone(),
            group: user,
            mutable: true,
        }
    }
}

/// Held while the shape of any tree changes, so the ancestry check and the
/// move out of the old parent's table happen as one step.
static RESHAPE: Mutex<()> = Mutex::new(());

/// The mutable tree node.
///
/// Children are owned through the child table; the parent link is a weak
/// back-pointer used only for lookups. Each node guards its own child table,
/// and adds and removes are additionally serialized process-wide, so a node
/// is never listed by two parents and never ends up under its own
/// descendant. Lookups and listings take only the table lock.
pub struct Node {
    id: NodeId,
    name: String,
    me: Weak<Node>,
    parent: RwLock<Weak<Node>>,
    children: Mutex<HashMap<String, Arc<Node>>>,
    listeners: RwLock<Vec<Arc<dyn FileChangeListener>>>,
    source: Option<Box<dyn ByteSource>>,
    length: OnceLock<Option<u64>>,
    metadata: RwLock<Metadata>,
    resolvers: OnceLock<Arc<ResolverChain>>,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        source: Option<Box<dyn ByteSource>>,
        metadata: Metadata,
    ) -> Arc<Self> {
        let name = sanitize_name(name.into());
        Arc::new_cyclic(|me| Node {
            id: NodeId::next(),
            name,
            me: me.clone(),
            parent: RwLock::new(Weak::new()),
            children: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            source,
            length: OnceLock::new(),
            metadata: RwLock::new(metadata),
            resolvers: OnceLock::new(),
        })
    }

    pub fn directory(name: impl Into<String>) -> Arc<Self> {
        Self::new(name, None, Metadata::default())
    }

    /// An in-memory file.
    pub fn file(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Arc<Self> {
        Self::with_source(name, MemorySource::new(contents))
    }

    pub fn with_source(name: impl Into<String>, source: impl ByteSource + 'static) -> Arc<Self> {
        let mut metadata = Metadata::default();
        if let Some(modified) = source.last_modified() {
            metadata.last_modified = modified;
        }
        Self::new(name, Some(Box::new(source)), metadata)
    }

    /// Adds `child` and hands back `self`, for building trees in one
    /// expression.
    pub fn with(self: Arc<Self>, child: Arc<Node>) -> Result<Arc<Self>, TreeError> {
        self.add(child)?;
        Ok(self)
    }

    /// Literal child lookup; never consults the resolver chain.
    pub fn child(&self, name: &str) -> Option<Arc<Node>> {
        self.children.lock().get(name).cloned()
    }

    /// Snapshot of the children as concrete nodes.
    pub fn children(&self) -> Vec<Arc<Node>> {
        let mut children = self.children.lock().values().cloned().collect::<Vec<_>>();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    pub fn parent_node(&self) -> Option<Arc<Node>> {
        self.parent.read().upgrade()
    }

    /// Installs the missing-node resolvers consulted by this node and every
    /// descendant without its own chain. Returns false if one was already set.
    pub fn install_resolvers(&self, chain: Arc<ResolverChain>) -> bool {
        self.resolvers.set(chain).is_ok()
    }

    /// Walks `path`, creating directories for missing steps, and returns the
    /// deepest directory. `None` if a step is an existing file.
    pub fn make_dirs(&self, path: &str) -> Option<Arc<Node>> {
        let mut current = self.me.upgrade()?;
        for token in canonicalize(path) {
            current = match current.child(token) {
                Some(existing) if existing.is_directory() => existing,
                Some(_) => {
                    debug!("Cannot create directory '{}' over a file", token);
                    return None;
                }
                None => {
                    let created = Node::directory(token);
                    current.add(created.clone()).ok()?;
                    created
                }
            };
        }
        Some(current)
    }

    fn as_file_ref(node: Arc<Node>) -> FileRef {
        node
    }

    fn is_ancestor_or_self(&self, candidate: &Node) -> bool {
        if candidate.id == self.id {
            return true;
        }
        let mut current = self.parent_node();
        while let Some(node) = current {
            if node.id == candidate.id {
                return true;
            }
            current = node.parent_node();
        }
        false
    }

    fn resolver_chain(&self) -> Option<Arc<ResolverChain>> {
        if let Some(chain) = self.resolvers.get() {
            return Some(chain.clone());
        }
        let mut current = self.parent_node();
        while let Some(node) = current {
            if let Some(chain) = node.resolvers.get() {
                return Some(chain.clone());
            }
            current = node.parent_node();
        }
        None
    }

    fn resolve_missing(&self, name: &str) -> Option<FileRef> {
        let chain = self.resolver_chain()?;
        let me = self.me.upgrade()?;
        let synthesized = chain.resolve(&me, name)?;
        {
            let mut parent = synthesized.parent.write();
            if parent.upgrade().is_none() {
                *parent = self.me.clone();
            }
        }
        Some(Self::as_file_ref(synthesized))
    }

    fn check_insertable(&self, node: &Node) -> Result<(), TreeError> {
        if node.id == self.id {
            return Err(TreeError::SelfReference {
                name: node.name.clone(),
            });
        }
        if self.is_ancestor_or_self(node) {
            return Err(TreeError::Cycle {
                name: node.name.clone(),
                parent: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Takes `node` out of this table if it is still the entry under its
    /// name. The caller re-points its parent.
    fn take_child(&self, node: &Arc<Node>) -> Option<Arc<Node>> {
        let mut children = self.children.lock();
        match children.get(&node.name) {
            Some(existing) if Arc::ptr_eq(existing, node) => children.remove(&node.name),
            _ => None,
        }
    }

    fn attach_all(&self, nodes: Vec<Arc<Node>>) -> Result<(), TreeError> {
        let mut moved = Vec::new();
        let mut added = Vec::with_capacity(nodes.len());
        let mut displaced = Vec::new();
        {
            let _reshape = RESHAPE.lock();
            for node in &nodes {
                self.check_insertable(node)?;
            }

            for node in &nodes {
                if let Some(old_parent) = node.parent_node() {
                    if old_parent.id != self.id {
                        if let Some(taken) = old_parent.take_child(node) {
                            moved.push((old_parent, taken));
                        }
                    }
                }
            }

            let mut children = self.children.lock();
            for node in nodes {
                if children
                    .get(&node.name)
                    .is_some_and(|existing| Arc::ptr_eq(existing, &node))
                {
                    continue;
                }
                *node.parent.write() = self.me.clone();
                if let Some(previous) = children.insert(node.name.clone(), node.clone()) {
                    *previous.parent.write() = Weak::new();
                    displaced.push(previous);
                }
                added.push(node);
            }
        }

        for (old_parent, node) in moved {
            old_parent.notify(|listener, file| listener.file_removed(file), node);
        }
        for previous in displaced {
            debug!("'{}' replaced an entry of the same name", previous.name);
            self.notify(|listener, file| listener.file_removed(file), previous);
        }
        for node in added {
            self.notify(|listener, file| listener.file_added(file), node);
        }
        Ok(())
    }

    fn detach_all<'a>(&self, names: impl Iterator<Item = &'a str>) -> Vec<Arc<Node>> {
        let _reshape = RESHAPE.lock();
        let removed = {
            let mut children = self.children.lock();
            names
                .filter_map(|name| children.remove(name))
                .collect::<Vec<_>>()
        };
        for node in &removed {
            *node.parent.write() = Weak::new();
        }
        removed
    }

    fn notify(&self, event: impl Fn(&dyn FileChangeListener, &FileRef), node: Arc<Node>) {
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }
        let file = Self::as_file_ref(node);
        for listener in listeners {
            event(listener.as_ref(), &file);
        }
    }

    fn estimate_length(&self) -> Option<u64> {
        let source = self.source.as_ref()?;
        if let Some(len) = source.len_hint() {
            return Some(len);
        }
        let counted = source
            .open()
            .and_then(|mut stream| io::copy(&mut stream, &mut io::sink()));
        match counted {
            Ok(len) => Some(len),
            Err(e) => {
                warn!("Failed to determine length of '{}': {}", self.name, e);
                None
            }
        }
    }
}

impl VirtualFile for Node {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> Option<FileRef> {
        self.parent_node().map(Self::as_file_ref)
    }

    fn get(&self, name: &str) -> Option<FileRef> {
        match name {
            "." => self.me.upgrade().map(Self::as_file_ref),
            ".." => self.parent(),
            _ => match self.child(name) {
                Some(child) => Some(Self::as_file_ref(child)),
                None => self.resolve_missing(name),
            },
        }
    }

    fn list(&self) -> Vec<FileRef> {
        self.children()
            .into_iter()
            .map(Self::as_file_ref)
            .collect()
    }

    fn open_stream(&self) -> Option<FileStream> {
        let source = self.source.as_ref()?;
        match source.open() {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("Failed to open '{}': {}", self.name, e);
                None
            }
        }
    }

    fn is_directory(&self) -> bool {
        self.source.is_none()
    }

    fn length(&self) -> Option<u64> {
        if self.is_directory() {
            return Some(self.children.lock().len() as u64);
        }
        *self.length.get_or_init(|| self.estimate_length())
    }

    fn last_modified(&self) -> SystemTime {
        self.metadata.read().last_modified
    }

    fn owner(&self) -> String {
        self.metadata.read().owner.clone()
    }

    fn group(&self) -> String {
        self.metadata.read().group.clone()
    }

    fn add(&self, node: Arc<Node>) -> Result<(), TreeError> {
        self.attach_all(vec![node])
    }

    fn add_all(&self, nodes: Vec<Arc<Node>>) -> Result<(), TreeError> {
        self.attach_all(nodes)
    }

    fn remove(&self, node: &dyn VirtualFile) -> Result<(), TreeError> {
        if node.id() == self.id {
            return Err(TreeError::SelfReference {
                name: self.name.clone(),
            });
        }
        for removed in self.detach_all(std::iter::once(node.name())) {
            self.notify(|listener, file| listener.file_removed(file), removed);
        }
        Ok(())
    }

    fn remove_all(&self, nodes: &[FileRef]) -> Result<(), TreeError> {
        if nodes.iter().any(|node| node.id() == self.id) {
            return Err(TreeError::SelfReference {
                name: self.name.clone(),
            });
        }
        for removed in self.detach_all(nodes.iter().map(|node| node.name())) {
            self.notify(|listener, file| listener.file_removed(file), removed);
        }
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn FileChangeListener>) {
        self.listeners.write().push(listener);
    }

    fn set_last_modified(&self, time: SystemTime) -> bool {
        {
            let mut metadata = self.metadata.write();
            if !metadata.mutable {
                return false;
            }
            metadata.last_modified = time;
        }
        if let (Some(parent), Some(me)) = (self.parent_node(), self.me.upgrade()) {
            parent.notify(|listener, file| listener.file_modified(file), me);
        }
        true
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let children = self
            .children
            .lock()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("source", &self.source)
            .field("children", &children)
            .finish()
    }
}

fn sanitize_name(name: String) -> String {
    if name.is_empty() {
        return "_".to_string();
    }
    if name == "." || name == ".." {
        return format!("_{name}");
    }
    if name.contains(SEPARATOR) {
        return name.replace(SEPARATOR, "\\");
    }
    name
}

#[derive(Debug, Snafu)]
pub enum TreeError {
    #[snafu(display("Node '{}' cannot be added to or removed from itself", name))]
    SelfReference { name: String },
    #[snafu(display("Adding '{}' under '{}' would create a cycle", name, parent))]
    Cycle { name: String, parent: String },
    #[snafu(display("Adding '{}' was denied: {}", name, reason))]
    Denied { name: String, reason: String },
}
