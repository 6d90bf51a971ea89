use std::io::Read;
use std::path::{Component, Path, PathBuf};

use compio::fs;
use snafu::{ResultExt, Snafu};
use tracing::{debug, warn};

use crate::ext::BestEffortPathExt;
use crate::filesystem::FileRef;

/// Materializes `node` and everything below it inside `target`.
///
/// Directories become directories, files get their stream copied. A file
/// whose stream cannot be opened is created empty.
pub async fn extract(node: FileRef, target: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(target).await.context(CreateDirSnafu {
        path: target.to_path_buf(),
    })?;

    let mut pending = vec![(node, target.to_path_buf())];
    while let Some((entry, dir)) = pending.pop() {
        let out = dir.join(checked_name(entry.name())?);
        if entry.is_directory() {
            debug!("Creating {}", out.best_effort_path_display());
            fs::create_dir_all(&out)
                .await
                .context(CreateDirSnafu { path: out.clone() })?;
            pending.extend(entry.list().into_iter().map(|child| (child, out.clone())));
        } else {
            let bytes = read_contents(&entry, &out)?;
            debug!("Writing {} bytes to {}", bytes.len(), out.best_effort_path_display());
            fs::write(&out, bytes)
                .await
                .0
                .context(WriteSnafu { path: out })?;
        }
    }
    Ok(())
}

/// A name must stay a single path component below its directory.
fn checked_name(name: &str) -> Result<&str, ExtractError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => UnsafeNameSnafu { name }.fail(),
    }
}

fn read_contents(entry: &FileRef, out: &Path) -> Result<Vec<u8>, ExtractError> {
    let mut bytes = Vec::new();
    match entry.open_stream() {
        Some(mut stream) => {
            stream
                .read_to_end(&mut bytes)
                .context(ReadSnafu { path: out })?;
        }
        None => warn!("'{}' has no readable content", entry.path()),
    }
    Ok(bytes)
}

#[derive(Debug, Snafu)]
pub enum ExtractError {
    #[snafu(display("Failed to create directory {}", path.best_effort_path_display()))]
    CreateDirError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to read content destined for {}", path.best_effort_path_display()))]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Refusing to extract '{}': not a plain file name", name))]
    UnsafeNameError { name: String },
    #[snafu(display("Failed to write {}", path.best_effort_path_display()))]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{FileChangeListener, FileStream, Node, NodeId, TreeError, VirtualFile};
    use crate::ingest::ManifestHandler;
    use std::sync::Arc;
    use std::time::SystemTime;
    use tempfile::TempDir;

    #[compio::test]
    async fn extract_recreates_the_subtree() {
        let root = Node::directory("root");
        let folder = Node::directory("folder");
        root.add(Node::file("test.txt", "It works!")).unwrap();
        root.add(folder.clone()).unwrap();
        folder.add(Node::file("file", "test")).unwrap();
        folder.add(Node::directory("empty")).unwrap();

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        extract(root, temp_dir.path()).await.unwrap();

        let base = temp_dir.path().join("root");
        assert_eq!(
            std::fs::read_to_string(base.join("test.txt")).unwrap(),
            "It works!"
        );
        assert_eq!(
            std::fs::read_to_string(base.join("folder/file")).unwrap(),
            "test"
        );
        assert!(base.join("folder/empty").is_dir());
    }

    #[derive(Debug)]
    struct Named(&'static str);

    impl VirtualFile for Named {
        fn id(&self) -> NodeId {
            NodeId::next()
        }
        fn name(&self) -> &str {
            self.0
        }
        fn parent(&self) -> Option<FileRef> {
            None
        }
        fn get(&self, _name: &str) -> Option<FileRef> {
            None
        }
        fn list(&self) -> Vec<FileRef> {
            Vec::new()
        }
        fn open_stream(&self) -> Option<FileStream> {
            Some(Box::new(std::io::Cursor::new(b"pwned".to_vec())))
        }
        fn is_directory(&self) -> bool {
            false
        }
        fn length(&self) -> Option<u64> {
            Some(5)
        }
        fn last_modified(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
        fn owner(&self) -> String {
            "nobody".to_string()
        }
        fn group(&self) -> String {
            "nobody".to_string()
        }
        fn add(&self, _node: Arc<Node>) -> Result<(), TreeError> {
            Ok(())
        }
        fn add_all(&self, _nodes: Vec<Arc<Node>>) -> Result<(), TreeError> {
            Ok(())
        }
        fn remove(&self, _node: &dyn VirtualFile) -> Result<(), TreeError> {
            Ok(())
        }
        fn remove_all(&self, _nodes: &[FileRef]) -> Result<(), TreeError> {
            Ok(())
        }
        fn add_listener(&self, _listener: Arc<dyn FileChangeListener>) {}
    }

    #[compio::test]
    async fn extract_refuses_names_that_leave_the_target() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path().join("dest");
        for name in ["..", ".", "/etc/passwd", "a/../../b"] {
            let result = extract(Arc::new(Named(name)), &dest).await;
            assert!(
                matches!(result, Err(ExtractError::UnsafeNameError { .. })),
                "{name} was accepted"
            );
        }
        assert!(!temp_dir.path().join("pwned").exists());
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[compio::test]
    async fn dotted_manifest_keys_stay_inside_the_target() {
        let root = ManifestHandler::default()
            .parse(
                "m",
                "\"..\":\n  \"..\":\n    evil.txt: \"pwned\"\n",
                Path::new("m.vfs.yaml"),
            )
            .unwrap()
            .unwrap();

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path().join("dest");
        extract(root, &dest).await.unwrap();

        assert!(!temp_dir.path().join("evil.txt").exists());
        assert_eq!(
            std::fs::read_to_string(dest.join("m/_../_../evil.txt")).unwrap(),
            "pwned"
        );
    }

    #[compio::test]
    async fn extract_single_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        extract(Node::file("lonely.bin", vec![0u8, 1, 2]), temp_dir.path())
            .await
            .unwrap();
        assert_eq!(
            std::fs::read(temp_dir.path().join("lonely.bin")).unwrap(),
            vec![0u8, 1, 2]
        );
    }
}
