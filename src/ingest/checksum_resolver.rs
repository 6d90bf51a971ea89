use std::sync::Arc;

use crate::filesystem::{MissingNodeResolver, Node, VirtualFile};

pub const CHECKSUM_SUFFIX: &str = ".metrohash";

/// Answers `<name>.metrohash` with the checksum of the sibling file `<name>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumResolver;

impl MissingNodeResolver for ChecksumResolver {
    fn resolve(&self, parent: &Arc<Node>, name: &str) -> Option<Arc<Node>> {
        let stem = name.strip_suffix(CHECKSUM_SUFFIX)?;
        let target = parent.child(stem).filter(|node| !node.is_directory())?;
        let checksum = target.checksum()?;
        Some(Node::file(name, format!("{checksum}\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{ContentChecksum, ResolverChain};
    use std::io::Read;

    fn tree() -> Arc<Node> {
        let root = Node::directory("root");
        root.install_resolvers(Arc::new(ResolverChain::new().register(ChecksumResolver)));
        root.add(Node::file("data.bin", "payload")).unwrap();
        root.add(Node::directory("dir")).unwrap();
        root
    }

    #[test]
    fn synthesizes_checksum_of_sibling() {
        let root = tree();
        let node = root.get("data.bin.metrohash").unwrap();

        let mut contents = String::new();
        node.open_stream().unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(
            contents,
            format!("{}\n", ContentChecksum::from_bytes(b"payload"))
        );
        assert_eq!(node.parent().unwrap().id(), root.id());
    }

    #[test]
    fn synthesized_nodes_stay_out_of_the_listing() {
        let root = tree();
        assert!(root.get("data.bin.metrohash").is_some());
        assert_eq!(root.list().len(), 2);
        assert!(root.child("data.bin.metrohash").is_none());
    }

    #[test]
    fn declines_directories_and_missing_files() {
        let root = tree();
        assert!(root.get("dir.metrohash").is_none());
        assert!(root.get("absent.metrohash").is_none());
        assert!(root.get("data.bin.md5").is_none());
    }

    #[test]
    fn serves_descendants_through_the_ancestor_chain() {
        let root = tree();
        let nested = root.make_dirs("a/b").unwrap();
        nested.add(Node::file("deep.txt", "deep")).unwrap();
        assert!(root.query("a/b/deep.txt.metrohash").is_some());
    }
}
