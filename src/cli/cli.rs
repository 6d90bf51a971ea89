use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::data::LogLevel;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Browse a directory as a virtual file tree")]
pub struct Cli {
    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    /// The directory to mirror into the tree
    #[clap(long, short, default_value = ".")]
    pub root: PathBuf,

    /// YAML config file
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    /// Reject adding nodes (removals are still allowed)
    #[clap(long)]
    pub read_only: bool,

    /// Hide names starting with a dot
    #[clap(long)]
    pub hide_dotfiles: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the whole tree
    Tree,
    /// List every node whose name contains the pattern, ignoring case
    Find { pattern: String },
    /// Write a file's content to stdout
    Cat { path: String },
    /// Show the metadata of a node
    Stat { path: String },
    /// Copy a subtree to a directory on disk
    Extract {
        destination: PathBuf,
        /// Subtree to copy
        #[clap(long, default_value = "/")]
        from: String,
    },
}
