use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use snafu::Snafu;
use tracing::{debug, warn};

use crate::ext::BestEffortPathExt;
use crate::filesystem::Node;

/// Inspects a raw file and optionally produces the tree embedded in it.
pub trait ContentHandler: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Returns a root whose children describe the embedded content, or `None`
    /// when the file is not something this handler understands.
    fn identify(&self, file: &Path) -> Result<Option<Arc<Node>>, IdentifyError>;
}

/// Content handlers in registration order, fixed once startup is done.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    handlers: Vec<Box<dyn ContentHandler>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: impl ContentHandler + 'static) -> Self {
        debug!("Registering content handler '{}'", handler.name());
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Offers `file` to every handler and collects the roots they produce.
    ///
    /// A failing handler is logged and skipped; the others still run.
    pub fn identify(&self, file: &Path) -> Vec<Arc<Node>> {
        self.handlers
            .iter()
            .filter_map(|handler| match handler.identify(file) {
                Ok(root) => root,
                Err(e) => {
                    warn!(
                        "Content handler '{}' failed on {}: {}",
                        handler.name(),
                        file.best_effort_path_display(),
                        e
                    );
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IdentifyError {
    #[snafu(display("Failed to read {}", path.best_effort_path_display()))]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to parse {}", path.best_effort_path_display()))]
    ParseError {
        path: PathBuf,
        source: saphyr::ScanError,
    },
    #[snafu(display("{} is malformed: {}", path.best_effort_path_display(), reason))]
    MalformedError { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::VirtualFile;

    #[derive(Debug)]
    struct Always(&'static str);

    impl ContentHandler for Always {
        fn name(&self) -> &str {
            self.0
        }

        fn identify(&self, _file: &Path) -> Result<Option<Arc<Node>>, IdentifyError> {
            Ok(Some(Node::directory(self.0)))
        }
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
                reason: "always fails".to_string(),
            })
        }
    }

    #[test]
    fn roots_come_back_in_registration_order() {
        let registry = PluginRegistry::new()
            .register(Always("first"))
            .register(Failing)
            .register(Always("second"));
        assert_eq!(registry.len(), 3);

        let roots = registry.identify(Path::new("whatever.bin"));
        let names = roots.iter().map(|r| r.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn empty_registry_identifies_nothing() {
        let registry = PluginRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.identify(Path::new("x")).is_empty());
    }

    #[test]
    fn identify_error_display() {
        let error = IdentifyError::MalformedError {
            path: PathBuf::from("/tmp/bad.vfs.yaml"),
            reason: "top level should be a map".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("/tmp/bad.vfs.yaml"));
        assert!(message.contains("top level should be a map"));
    }
}
