use crate::filesystem::FileRef;

/// Observer of changes to one node's immediate children.
///
/// Notification is synchronous and happens on the mutating thread, after the
/// child table lock has been released. Ancestors are not notified.
pub trait FileChangeListener: Send + Sync {
    fn file_added(&self, _file: &FileRef) {}

    fn file_modified(&self, _file: &FileRef) {}

    fn file_removed(&self, _file: &FileRef) {}
}
