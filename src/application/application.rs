use std::sync::Arc;

use snafu::Snafu;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::application::RuntimeConfig;
use crate::application::commands::{self, CommandError};
use crate::config::{ConfigError, VfsConfig};
use crate::filesystem::{FileRef, Guarded, Node, ResolverChain, SEPARATOR, VirtualFile};
use crate::ingest::{
    ChecksumResolver, IngestError, LocalProvider, ManifestHandler, PluginRegistry, WorkerPool,
    WorkerPoolError,
};
use crate::policy::StandardPolicy;

pub struct Application;

impl Application {
    pub async fn run(app_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();
        let config = match &app_config.config {
            Some(path) => VfsConfig::read(path).await.context(ConfigSnafu)?,
            None => VfsConfig::default(),
        };
        debug!("Loaded config: {:?}", config);

        let tree = Self::build(&app_config, &config).await?;
        commands::run(&app_config.command, tree)
            .await
            .context(CommandSnafu)?;

        Ok(())
    }

    /// Ingests the root directory and layers the configured extras and
    /// access policy over it.
    pub async fn build(
        app_config: &RuntimeConfig,
        config: &VfsConfig,
    ) -> Result<FileRef, ApplicationError> {
        let pool = WorkerPool::new(config.workers).context(WorkerPoolSnafu)?;
        let plugins = PluginRegistry::new().register(ManifestHandler::new(&config.manifest_suffix));

        let root = LocalProvider::ingest(&app_config.root, Arc::new(plugins), &pool)
            .await
            .context(IngestSnafu)?;

        if config.virtual_checksums {
            let chain = ResolverChain::new().register(ChecksumResolver);
            root.install_resolvers(Arc::new(chain));
        }
        attach_mocks(&root, &config.mocks);

        let policy = StandardPolicy {
            read_only: config.read_only || app_config.read_only,
            hide_dotfiles: config.hide_dotfiles || app_config.hide_dotfiles,
        };
        info!("Serving {} with {:?}", root.name(), policy);
        Ok(Guarded::new(root, policy))
    }
}

fn attach_mocks(root: &Arc<Node>, mocks: &[(String, Option<String>)]) {
    if !mocks.is_empty() && !root.is_directory() {
        warn!("Ignoring {} mocks: the root is a single file", mocks.len());
        return;
    }
    for (path, contents) in mocks {
        let trimmed = path.trim_matches(SEPARATOR);
        let (parent_path, name) = trimmed.rsplit_once(SEPARATOR).unwrap_or(("", trimmed));
        if name.is_empty() {
            warn!("Ignoring mock '{}' without a name", path);
            continue;
        }
        let Some(parent) = root.make_dirs(parent_path) else {
            warn!("Cannot place mock '{}': a file is in the way", path);
            continue;
        };

        let node = match contents {
            Some(contents) => Node::file(name, contents.as_bytes()),
            None => match parent.child(name) {
                Some(existing) if existing.is_directory() => continue,
                _ => Node::directory(name),
            },
        };
        if let Some(existing) = parent.child(name) {
            debug!("Mock '{}' replaces {}", path, existing.path());
        }
        if let Err(e) = parent.add(node) {
            warn!("Cannot place mock '{}': {}", path, e);
        }
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered during configuration stage"))]
    ConfigError { source: ConfigError },
    #[snafu(display("Critical failure encountered while starting the worker pool"))]
    WorkerPoolError { source: WorkerPoolError },
    #[snafu(display("Critical failure encountered while building the tree"))]
    IngestError { source: IngestError },
    #[snafu(display("Command failed"))]
    CommandError { source: CommandError },
}
