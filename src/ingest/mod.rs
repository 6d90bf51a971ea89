//! Building trees from external sources.
//!
//! A provider walks its source, attaching nodes as it goes, and hands every
//! regular file to the [`PluginRegistry`] on a [`WorkerPool`]. Subtrees found
//! inside files are unioned into the live tree by a [`Merger`].

mod checksum_resolver;
mod local_provider;
mod manifest;
mod merge;
mod plugin;
mod worker_pool;

pub use checksum_resolver::{CHECKSUM_SUFFIX, ChecksumResolver};
pub use local_provider::{IngestError, LocalProvider};
pub use manifest::{DEFAULT_MANIFEST_SUFFIX, ManifestHandler};
pub use merge::Merger;
pub use plugin::{ContentHandler, IdentifyError, PluginRegistry};
pub use worker_pool::{TaskHandle, WorkerPool, WorkerPoolError};
