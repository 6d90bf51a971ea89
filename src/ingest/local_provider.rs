use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use snafu::{ResultExt, Snafu};
use tracing::{debug, info, warn};

use crate::ext::BestEffortPathExt;
use crate::filesystem::{DiskSource, Metadata, Node, VirtualFile};
use crate::ingest::merge::Merger;
use crate::ingest::plugin::PluginRegistry;
use crate::ingest::worker_pool::{TaskHandle, WorkerPool, WorkerPoolError};

/// Mirrors a directory of the local disk into the tree.
pub struct LocalProvider;

impl LocalProvider {
    /// Builds the tree for `path` and returns once every background
    /// identification task has finished.
    ///
    /// Directories are attached while walking. Regular files are attached
    /// too and offered to `plugins` on `pool`; whatever the handlers find is
    /// merged next to the file. Unreadable sub-directories and failing
    /// handlers are logged and skipped. Symbolic links below `path` are never
    /// followed and do not appear in the tree.
    pub async fn ingest(
        path: &Path,
        plugins: Arc<PluginRegistry>,
        pool: &WorkerPool,
    ) -> Result<Arc<Node>, IngestError> {
        let started = Instant::now();
        let metadata = std::fs::metadata(path).context(SourceSnafu { path })?;
        let name = match path.canonicalize() {
            Ok(canonical) => root_name(&canonical),
            Err(_) => root_name(path),
        };
        if !metadata.is_dir() {
            debug!("{} is not a directory, serving it alone", path.display());
            return Ok(disk_file(name, path, &metadata));
        }

        let root = disk_directory(name, &metadata);
        let mut walk = Walk {
            plugins,
            merger: Arc::new(Merger::new()),
            pool,
            handles: Vec::new(),
            files: 0,
        };
        let entries = std::fs::read_dir(path).context(SourceSnafu { path })?;
        walk.visit(entries, path, &root)?;

        let Walk { handles, files, .. } = walk;
        debug!("Waiting for {} identification tasks", handles.len());
        let results = futures::future::join_all(handles.into_iter().map(TaskHandle::wait)).await;
        for result in results {
            if let Err(e) = result {
                warn!("Identification task did not finish: {}", e);
            }
        }

        info!(
            "Ingested {} files from {} in {:.2?}",
            files,
            path.best_effort_path_display(),
            started.elapsed()
        );
        Ok(root)
    }
}

struct Walk<'a> {
    plugins: Arc<PluginRegistry>,
    merger: Arc<Merger>,
    pool: &'a WorkerPool,
    handles: Vec<TaskHandle<()>>,
    files: usize,
}

impl Walk<'_> {
    fn visit(
        &mut self,
        entries: std::fs::ReadDir,
        dir_path: &Path,
        dir: &Arc<Node>,
    ) -> Result<(), IngestError> {
        let mut entries = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!("Skipping entry of {}: {}", dir_path.display(), e);
                    None
                }
            })
            .collect::<Vec<_>>();
        entries.sort();

        for entry in entries {
            let metadata = match std::fs::symlink_metadata(&entry) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping {}: {}", entry.display(), e);
                    continue;
                }
            };
            let name = root_name(&entry);

            if metadata.is_dir() {
                let node = disk_directory(name, &metadata);
                self.attach(dir, node.clone());
                match std::fs::read_dir(&entry) {
                    Ok(children) => self.visit(children, &entry, &node)?,
                    Err(e) => warn!(
                        "Skipping unreadable directory {}: {}",
                        entry.best_effort_path_display(),
                        e
                    ),
                }
            } else if metadata.is_file() {
                self.attach(dir, disk_file(name, &entry, &metadata));
                self.files += 1;
                self.identify(entry, dir)?;
            } else if metadata.file_type().is_symlink() {
                info!("Not following symbolic link {}", entry.display());
            } else {
                debug!("Skipping special file {}", entry.display());
            }
        }
        Ok(())
    }

    /// Goes through the merger so content merged in the meantime is kept.
    fn attach(&self, dir: &Arc<Node>, node: Arc<Node>) {
        if let Err(e) = self.merger.attach(node, dir) {
            warn!("Failed to attach to '{}': {}", dir.path(), e);
        }
    }

    fn identify(&mut self, file: PathBuf, parent: &Arc<Node>) -> Result<(), IngestError> {
        if self.plugins.is_empty() {
            return Ok(());
        }
        let plugins = self.plugins.clone();
        let merger = self.merger.clone();
        let parent = parent.clone();
        let label = file.display().to_string();

        let handle = self
            .pool
            .submit(label, move || {
                for root in plugins.identify(&file) {
                    if let Err(e) = merger.merge(&root, &parent) {
                        warn!("Failed to merge content of {}: {}", file.display(), e);
                    }
                }
            })
            .context(WorkerPoolSnafu)?;
        self.handles.push(handle);
        Ok(())
    }
}

fn root_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn disk_metadata(metadata: &std::fs::Metadata) -> Metadata {
    Metadata {
        last_modified: metadata.modified().unwrap_or_else(|_| SystemTime::now()),
        mutable: false,
        ..Metadata::default()
    }
}

fn disk_directory(name: String, metadata: &std::fs::Metadata) -> Arc<Node> {
    Node::new(name, None, disk_metadata(metadata))
}

fn disk_file(name: String, path: &Path, metadata: &std::fs::Metadata) -> Arc<Node> {
    Node::new(
        name,
        Some(Box::new(DiskSource::new(path, metadata))),
        disk_metadata(metadata),
    )
}

#[derive(Debug, Snafu)]
pub enum IngestError {
    #[snafu(display("Failed to read source {}", path.best_effort_path_display()))]
    SourceError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to schedule identification"))]
    WorkerPoolError { source: WorkerPoolError },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::FileRef;
    use crate::ingest::manifest::ManifestHandler;
    use crate::ingest::plugin::{ContentHandler, IdentifyError};
    use std::fs;
    use std::io::Read;
    use std::num::NonZeroUsize;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn read(file: &FileRef) -> String {
        let mut contents = String::new();
        file.open_stream()
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        contents
    }

    fn names(file: &FileRef) -> Vec<String> {
        file.list().iter().map(|f| f.name().to_string()).collect()
    }

    fn pool() -> WorkerPool {
        WorkerPool::new(NonZeroUsize::new(4)).unwrap()
    }

    #[derive(Debug)]
    struct Failing;

    impl ContentHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn identify(&self, file: &Path) -> Result<Option<Arc<Node>>, IdentifyError> {
            Err(IdentifyError::MalformedError {
                path: file.to_path_buf(),
                reason: "refuses everything".to_string(),
            })
        }
    }

    /// Takes its time before announcing a `<file>.seen` sibling.
    #[derive(Debug)]
    struct Slow;

    impl ContentHandler for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn identify(&self, file: &Path) -> Result<Option<Arc<Node>>, IdentifyError> {
            thread::sleep(Duration::from_millis(20));
            let name = root_name(file);
            let root = Node::directory("slow");
            root.add(Node::file(format!("{name}.seen"), "")).unwrap();
            Ok(Some(root))
        }
    }

    #[compio::test]
    async fn mirrors_the_directory_layout() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
        fs::write(temp_dir.path().join("a/b/c.txt"), "disk bytes").unwrap();
        fs::write(temp_dir.path().join("top.txt"), "top").unwrap();

        let root: FileRef = LocalProvider::ingest(
            temp_dir.path(),
            Arc::new(PluginRegistry::new()),
            &pool(),
        )
        .await
        .unwrap();

        assert_eq!(names(&root), vec!["a", "top.txt"]);
        let file = root.query("a/b/c.txt").unwrap();
        assert_eq!(read(&file), "disk bytes");
        assert_eq!(file.length(), Some(10));
        assert_eq!(file.parent().unwrap().name(), "b");
        assert!(!file.set_last_modified(SystemTime::UNIX_EPOCH));
    }

    #[compio::test]
    async fn manifest_content_unions_with_disk_siblings() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("docs")).unwrap();
        fs::write(temp_dir.path().join("docs/readme.txt"), "on disk").unwrap();
        fs::write(
            temp_dir.path().join("bundle.vfs.yaml"),
            "docs/extra.txt: \"declared\"\nnotes:\n  todo.txt: \"write more\"\n",
        )
        .unwrap();

        let plugins = PluginRegistry::new().register(ManifestHandler::default());
        let root: FileRef = LocalProvider::ingest(temp_dir.path(), Arc::new(plugins), &pool())
            .await
            .unwrap();

        let docs = root.get("docs").unwrap();
        assert_eq!(names(&docs), vec!["extra.txt", "readme.txt"]);
        assert_eq!(read(&docs.get("extra.txt").unwrap()), "declared");
        assert_eq!(read(&root.query("notes/todo.txt").unwrap()), "write more");
        assert!(root.get("bundle.vfs.yaml").is_some());
    }

    #[compio::test]
    async fn failing_handler_does_not_stop_the_others() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("one.vfs.yaml"), "from-one: \"1\"\n").unwrap();
        fs::write(temp_dir.path().join("two.vfs.yaml"), "- not a map\n").unwrap();

        let plugins = PluginRegistry::new()
            .register(Failing)
            .register(ManifestHandler::default());
        let root: FileRef = LocalProvider::ingest(temp_dir.path(), Arc::new(plugins), &pool())
            .await
            .unwrap();

        assert_eq!(read(&root.get("from-one").unwrap()), "1");
        assert_eq!(names(&root), vec!["from-one", "one.vfs.yaml", "two.vfs.yaml"]);
    }

    #[compio::test]
    async fn returns_only_after_every_task_finished() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..12 {
            fs::write(temp_dir.path().join(format!("f{i:02}")), "x").unwrap();
        }

        let plugins = PluginRegistry::new().register(Slow);
        let root: FileRef = LocalProvider::ingest(temp_dir.path(), Arc::new(plugins), &pool())
            .await
            .unwrap();

        assert_eq!(root.list().len(), 24);
        assert!(root.get("f11.seen").is_some());
    }

    #[cfg(unix)]
    #[compio::test]
    async fn symbolic_links_are_left_out() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "outside").unwrap();
        fs::write(temp_dir.path().join("real.txt"), "inside").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("escape")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("real.txt"),
            temp_dir.path().join("alias.txt"),
        )
        .unwrap();

        let root: FileRef = LocalProvider::ingest(
            temp_dir.path(),
            Arc::new(PluginRegistry::new()),
            &pool(),
        )
        .await
        .unwrap();

        assert_eq!(names(&root), vec!["real.txt"]);
        assert!(root.query("escape/secret.txt").is_none());
    }

    #[compio::test]
    async fn single_file_source_is_served_alone() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("lonely.txt");
        fs::write(&file_path, "alone").unwrap();

        let root: FileRef = LocalProvider::ingest(&file_path, Arc::new(PluginRegistry::new()), &pool())
            .await
            .unwrap();
        assert!(!root.is_directory());
        assert_eq!(root.name(), "lonely.txt");
        assert_eq!(read(&root), "alone");
    }

    #[compio::test]
    async fn missing_source_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = LocalProvider::ingest(
            &temp_dir.path().join("absent"),
            Arc::new(PluginRegistry::new()),
            &pool(),
        )
        .await;
        assert!(matches!(result, Err(IngestError::SourceError { .. })));
    }
}
