//! The virtual file tree.
//!
//! This module provides the node contract every tree entity implements, the
//! mutable node that backs most trees, path resolution, the missing-node
//! resolver chain and the access-control decorator that can be layered over
//! any subtree.

mod checksum;
mod contract;
mod extract;
mod guarded;
mod listener;
mod node;
mod path;
mod resolver;
mod source;

pub use checksum::ContentChecksum;
pub use contract::{FileRef, FileStream, NodeId, SEPARATOR, VirtualFile, current_user};
pub use extract::{ExtractError, extract};
pub use guarded::{AccessPolicy, Guarded};
pub use listener::FileChangeListener;
pub use node::{Metadata, Node, TreeError};
pub use path::{canonicalize, resolve};
pub use resolver::{MissingNodeResolver, ResolverChain};
pub use source::{ByteSource, DiskSource, MemorySource};
