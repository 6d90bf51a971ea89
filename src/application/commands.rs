use std::io::{self, Write};
use std::path::PathBuf;
use std::time::SystemTime;

use colored::Colorize;
use snafu::prelude::*;
use supports_color::Stream;
use tracing::debug;

use crate::cli::Command;
use crate::filesystem::{ExtractError, FileRef, extract};

pub async fn run(command: &Command, root: FileRef) -> Result<(), CommandError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match command {
        Command::Tree => {
            let color = supports_color::on(Stream::Stdout).is_some();
            debug!("Rendering tree, color: {}", color);
            colored::control::set_override(color);
            render_tree(&root, &mut out)
        }
        Command::Find { pattern } => find(&root, pattern, &mut out),
        Command::Cat { path } => cat(&root, path, &mut out),
        Command::Stat { path } => stat(&root, path, &mut out),
        Command::Extract { destination, from } => {
            let node = lookup(&root, from)?;
            extract(node, destination)
                .await
                .context(ExtractSnafu {
                    destination: destination.clone(),
                })
        }
    }
}

fn lookup(root: &FileRef, path: &str) -> Result<FileRef, CommandError> {
    root.query(path).context(NotFoundSnafu { path })
}

/// Indented listing; directories carry a trailing separator.
pub(crate) fn render_tree(root: &FileRef, out: &mut impl Write) -> Result<(), CommandError> {
    writeln!(out, "{}", root.name().blue().bold()).context(OutputSnafu)?;
    let mut pending = root
        .list()
        .into_iter()
        .rev()
        .map(|child| (child, 1))
        .collect::<Vec<_>>();
    while let Some((entry, depth)) = pending.pop() {
        let indent = "  ".repeat(depth);
        if entry.is_directory() {
            writeln!(out, "{indent}{}/", entry.name().blue().bold()).context(OutputSnafu)?;
            pending.extend(entry.list().into_iter().rev().map(|child| (child, depth + 1)));
        } else {
            writeln!(out, "{indent}{}", entry.name()).context(OutputSnafu)?;
        }
    }
    Ok(())
}

pub(crate) fn find(root: &FileRef, pattern: &str, out: &mut impl Write) -> Result<(), CommandError> {
    for found in root.find(pattern) {
        writeln!(out, "{}", found.path()).context(OutputSnafu)?;
    }
    Ok(())
}

pub(crate) fn cat(root: &FileRef, path: &str, out: &mut impl Write) -> Result<(), CommandError> {
    let file = lookup(root, path)?;
    ensure!(!file.is_directory(), NotAFileSnafu { path });
    let mut stream = file.open_stream().context(UnreadableSnafu { path })?;
    io::copy(&mut stream, out).context(OutputSnafu)?;
    Ok(())
}

pub(crate) fn stat(root: &FileRef, path: &str, out: &mut impl Write) -> Result<(), CommandError> {
    let node = lookup(root, path)?;
    let kind = if node.is_directory() { "directory" } else { "file" };
    let length = node
        .length()
        .map(|length| length.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let modified = node
        .last_modified()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|since| since.as_secs())
        .unwrap_or_default();

    writeln!(out, "name:     {}", node.name()).context(OutputSnafu)?;
    writeln!(out, "path:     {}", node.path()).context(OutputSnafu)?;
    writeln!(out, "id:       {}", node.id()).context(OutputSnafu)?;
    writeln!(out, "kind:     {kind}").context(OutputSnafu)?;
    writeln!(out, "length:   {length}").context(OutputSnafu)?;
    writeln!(out, "modified: {modified}").context(OutputSnafu)?;
    writeln!(out, "owner:    {}", node.owner()).context(OutputSnafu)?;
    writeln!(out, "group:    {}", node.group()).context(OutputSnafu)?;
    if node.is_file() {
        let checksum = node
            .checksum()
            .map(|checksum| checksum.to_string())
            .unwrap_or_else(|| "unavailable".to_string());
        writeln!(out, "checksum: {checksum}").context(OutputSnafu)?;
    }
    Ok(())
}

#[derive(Debug, Snafu)]
pub enum CommandError {
    #[snafu(display("No such node: {}", path))]
    NotFound { path: String },
    #[snafu(display("{} is a directory", path))]
    NotAFile { path: String },
    #[snafu(display("{} cannot be read", path))]
    Unreadable { path: String },
    #[snafu(display("Failed to write output"))]
    OutputError { source: io::Error },
    #[snafu(display("Failed to extract into {}", destination.display()))]
    ExtractError {
        destination: PathBuf,
        source: ExtractError,
    },
}
