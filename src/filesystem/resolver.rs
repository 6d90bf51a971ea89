use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::filesystem::{Node, VirtualFile};

/// Fallback consulted when a literal child lookup misses.
///
/// Returned nodes are handed to the caller as-is and are not inserted into
/// the parent's child table, so repeated lookups call the resolver again.
pub trait MissingNodeResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, parent: &Arc<Node>, name: &str) -> Option<Arc<Node>>;
}

/// Ordered list of [`MissingNodeResolver`]s, fixed once built.
#[derive(Debug, Default)]
pub struct ResolverChain {
    resolvers: Vec<Box<dyn MissingNodeResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, resolver: impl MissingNodeResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// First non-`None` answer in registration order.
    pub fn resolve(&self, parent: &Arc<Node>, name: &str) -> Option<Arc<Node>> {
        let found = self
            .resolvers
            .iter()
            .find_map(|resolver| resolver.resolve(parent, name));
        if found.is_some() {
            trace!("Synthesized '{}' under '{}'", name, parent.name());
        }
        found
    }
}
