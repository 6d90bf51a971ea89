mod vfs_config;

pub use vfs_config::{ConfigError, VfsConfig};
