use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::filesystem::{
    FileChangeListener, FileRef, FileStream, Node, NodeId, TreeError, VirtualFile,
};

/// Hook points a [`Guarded`] node routes through before touching the node it
/// wraps. Every hook defaults to plain delegation, so a policy only overrides
/// what it wants to deny, rewrite or log.
pub trait AccessPolicy: Send + Sync + fmt::Debug + 'static {
    fn list(&self, dir: &dyn VirtualFile) -> Vec<FileRef> {
        dir.list()
    }

    fn get(&self, dir: &dyn VirtualFile, name: &str) -> Option<FileRef> {
        dir.get(name)
    }

    fn add(&self, dir: &dyn VirtualFile, node: Arc<Node>) -> Result<(), TreeError> {
        dir.add(node)
    }

    fn open_stream(&self, file: &dyn VirtualFile) -> Option<FileStream> {
        file.open_stream()
    }
}

/// Wraps any node so that every operation passes through an [`AccessPolicy`].
///
/// Nodes handed back from `get`, `list`, `query`, `find` and `parent`, and
/// nodes passed to listeners, are wrapped with the same policy, so navigating
/// away from the original node never escapes it.
pub struct Guarded<P: AccessPolicy> {
    inner: FileRef,
    policy: Arc<P>,
}

impl<P: AccessPolicy> Guarded<P> {
    pub fn new(inner: FileRef, policy: P) -> FileRef {
        Self::with_shared(inner, Arc::new(policy))
    }

    pub fn with_shared(inner: FileRef, policy: Arc<P>) -> FileRef {
        Arc::new(Guarded { inner, policy })
    }

    fn wrap(&self, file: FileRef) -> FileRef {
        Self::with_shared(file, self.policy.clone())
    }
}

impl<P: AccessPolicy> fmt::Debug for Guarded<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("inner", &self.inner)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<P: AccessPolicy> VirtualFile for Guarded<P> {
    fn id(&self) -> NodeId {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn parent(&self) -> Option<FileRef> {
        self.inner.parent().map(|parent| self.wrap(parent))
    }

    fn get(&self, name: &str) -> Option<FileRef> {
        self.policy
            .get(self.inner.as_ref(), name)
            .map(|file| self.wrap(file))
    }

    fn list(&self) -> Vec<FileRef> {
        self.policy
            .list(self.inner.as_ref())
            .into_iter()
            .map(|file| self.wrap(file))
            .collect()
    }

    fn open_stream(&self) -> Option<FileStream> {
        self.policy.open_stream(self.inner.as_ref())
    }

    fn is_directory(&self) -> bool {
        self.inner.is_directory()
    }

    fn length(&self) -> Option<u64> {
        self.inner.length()
    }

    fn last_modified(&self) -> SystemTime {
        self.inner.last_modified()
    }

    fn owner(&self) -> String {
        self.inner.owner()
    }

    fn group(&self) -> String {
        self.inner.group()
    }

    fn add(&self, node: Arc<Node>) -> Result<(), TreeError> {
        self.policy.add(self.inner.as_ref(), node)
    }

    fn add_all(&self, nodes: Vec<Arc<Node>>) -> Result<(), TreeError> {
        for node in nodes {
            self.policy.add(self.inner.as_ref(), node)?;
        }
        Ok(())
    }

    fn remove(&self, node: &dyn VirtualFile) -> Result<(), TreeError> {
        self.inner.remove(node)
    }

    fn remove_all(&self, nodes: &[FileRef]) -> Result<(), TreeError> {
        self.inner.remove_all(nodes)
    }

    fn add_listener(&self, listener: Arc<dyn FileChangeListener>) {
        self.inner.add_listener(Arc::new(GuardedListener {
            listener,
            policy: self.policy.clone(),
        }));
    }

    fn path(&self) -> String {
        self.inner.path()
    }

    fn exists(&self) -> bool {
        self.inner.exists()
    }

    fn can_read(&self) -> bool {
        self.inner.can_read()
    }

    fn can_write(&self) -> bool {
        self.inner.can_write()
    }

    fn can_execute(&self) -> bool {
        self.inner.can_execute()
    }

    fn create_new_file(&self) -> bool {
        self.inner.create_new_file()
    }

    fn delete(&self) -> bool {
        self.inner.delete()
    }

    fn rename_to(&self, name: &str) -> bool {
        self.inner.rename_to(name)
    }

    fn set_executable(&self, executable: bool) -> bool {
        self.inner.set_executable(executable)
    }

    fn set_readable(&self, readable: bool) -> bool {
        self.inner.set_readable(readable)
    }

    fn set_writable(&self, writable: bool) -> bool {
        self.inner.set_writable(writable)
    }

    fn set_last_modified(&self, time: SystemTime) -> bool {
        self.inner.set_last_modified(time)
    }
}

struct GuardedListener<P: AccessPolicy> {
    listener: Arc<dyn FileChangeListener>,
    policy: Arc<P>,
}

impl<P: AccessPolicy> GuardedListener<P> {
    fn wrap(&self, file: &FileRef) -> FileRef {
        Guarded::with_shared(file.clone(), self.policy.clone())
    }
}

impl<P: AccessPolicy> FileChangeListener for GuardedListener<P> {
    fn file_added(&self, file: &FileRef) {
        self.listener.file_added(&self.wrap(file));
    }

    fn file_modified(&self, file: &FileRef) {
        self.listener.file_modified(&self.wrap(file));
    }

    fn file_removed(&self, file: &FileRef) {
        self.listener.file_removed(&self.wrap(file));
    }
}
