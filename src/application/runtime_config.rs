use std::path::PathBuf;

use crate::cli::{Cli, Command};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub root: PathBuf,
    pub config: Option<PathBuf>,
    pub read_only: bool,
    pub hide_dotfiles: bool,
    pub command: Command,
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            root: cli.root,
            config: cli.config,
            read_only: cli.read_only,
            hide_dotfiles: cli.hide_dotfiles,
            command: cli.command,
        }
    }
}
