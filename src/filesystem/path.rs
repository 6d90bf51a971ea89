use tracing::trace;

use crate::filesystem::{FileRef, SEPARATOR, VirtualFile};

/// Splits `path` on [`SEPARATOR`] and folds away empty tokens, `.` and `..`.
///
/// `..` pops the previous token and is ignored once the stack is empty, so
/// the result never climbs above the starting node.
pub fn canonicalize(path: &str) -> Vec<&str> {
    let mut stack = Vec::new();
    for token in path.split(SEPARATOR) {
        match token {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(token),
        }
    }
    stack
}

/// Resolves `path` relative to `start` through successive `get` calls.
///
/// A path without a separator is a single lookup, so `.` and `..` keep their
/// meaning there. Anything else is canonicalized first and walked left to
/// right, stopping at the first miss.
pub fn resolve<F>(start: &F, path: &str) -> Option<FileRef>
where
    F: VirtualFile + ?Sized,
{
    if !path.contains(SEPARATOR) {
        return start.get(path);
    }
    let tokens = canonicalize(path);
    trace!("Resolving {:?} from '{}'", tokens, start.name());
    let Some((first, rest)) = tokens.split_first() else {
        return start.get(".");
    };
    rest.iter()
        .try_fold(start.get(first)?, |node, token| node.get(token))
}
