use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::ResultExt;
use tracing::debug;

use crate::filesystem::{Node, SEPARATOR, VirtualFile};
use crate::ingest::plugin::{ContentHandler, IdentifyError, ParseSnafu, ReadSnafu};

pub const DEFAULT_MANIFEST_SUFFIX: &str = ".vfs.yaml";

/// Expands YAML manifests into the subtree they describe.
///
/// The top-level mapping is a directory. A string value is a file with that
/// content, a mapping value is a directory, `null` is an empty directory.
/// Keys containing `/` create intermediate directories.
#[derive(Debug, Clone)]
pub struct ManifestHandler {
    suffix: String,
}

impl Default for ManifestHandler {
    fn default() -> Self {
        Self::new(DEFAULT_MANIFEST_SUFFIX)
    }
}

impl ManifestHandler {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    fn matches(&self, file: &Path) -> bool {
        file.file_name()
            .map(|name| name.to_string_lossy().ends_with(&self.suffix))
            .unwrap_or(false)
    }

    /// Builds the tree described by `contents`. `None` for an empty document.
    pub fn parse(
        &self,
        root_name: &str,
        contents: &str,
        file: &Path,
    ) -> Result<Option<Arc<Node>>, IdentifyError> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu { path: file })?;
        let Some(document) = documents.first() else {
            return Ok(None);
        };
        if matches!(document, Yaml::Value(Scalar::Null)) {
            return Ok(None);
        }
        let top_level = document
            .as_mapping()
            .ok_or_else(|| IdentifyError::MalformedError {
                path: file.to_path_buf(),
                reason: "top level should be a map".to_string(),
            })?;

        let root = Node::directory(root_name);
        populate(&root, top_level);
        Ok(Some(root))
    }
}

impl ContentHandler for ManifestHandler {
    fn name(&self) -> &str {
        "manifest"
    }

    fn identify(&self, file: &Path) -> Result<Option<Arc<Node>>, IdentifyError> {
        if !self.matches(file) {
            return Ok(None);
        }
        debug!("Expanding manifest {}", file.display());
        let contents = std::fs::read_to_string(file).context(ReadSnafu { path: file })?;
        let root_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.parse(&root_name, &contents, file)
    }
}

fn populate(dir: &Arc<Node>, entries: &LinkedHashMap<Yaml, Yaml>) {
    for (key, value) in entries {
        let Some(key) = key_text(key) else {
            debug!("Skipping manifest entry with a non-scalar key: {:?}", key);
            continue;
        };
        let (parent_path, name) = match key.rsplit_once(SEPARATOR) {
            Some((parent_path, name)) => (parent_path, name),
            None => ("", &*key),
        };
        if name.is_empty() {
            debug!("Skipping manifest entry '{}' without a name", key);
            continue;
        }
        let Some(parent) = dir.make_dirs(parent_path) else {
            debug!("Skipping manifest entry '{}': a file is in the way", key);
            continue;
        };

        let node = match value {
            Yaml::Value(Scalar::String(contents)) => Node::file(name, contents.as_bytes()),
            Yaml::Value(Scalar::Null) => Node::directory(name),
            Yaml::Mapping(children) => {
                let node = parent
                    .child(name)
                    .filter(|existing| existing.is_directory())
                    .unwrap_or_else(|| Node::directory(name));
                populate(&node, children);
                node
            }
            other => match scalar_text(other) {
                Some(text) => Node::file(name, text),
                None => {
                    debug!("Skipping manifest entry '{}' with unsupported value", key);
                    continue;
                }
            },
        };
        if let Err(e) = parent.add(node) {
            debug!("Skipping manifest entry '{}': {}", key, e);
        }
    }
}

fn key_text<'a>(key: &'a Yaml) -> Option<Cow<'a, str>> {
    match key {
        Yaml::Value(Scalar::String(text)) => Some(Cow::Borrowed(text.as_ref())),
        other => scalar_text(other).map(Cow::Owned),
    }
}

fn scalar_text(value: &Yaml) -> Option<String> {
    match value {
        Yaml::Value(Scalar::Integer(number)) => Some(number.to_string()),
        Yaml::Value(Scalar::FloatingPoint(number)) => Some(number.to_string()),
        Yaml::Value(Scalar::Boolean(flag)) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn contents_of(root: &Arc<Node>, path: &str) -> String {
        let mut contents = String::new();
        root.query(path)
            .unwrap_or_else(|| panic!("missing {path}"))
            .open_stream()
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        contents
    }

    fn parse(yaml: &str) -> Result<Option<Arc<Node>>, IdentifyError> {
        ManifestHandler::default().parse("m", yaml, Path::new("m.vfs.yaml"))
    }

    #[test]
    fn nested_mappings_become_directories() {
        let root = parse(
            r##"
readme.txt: "top level"
docs:
  guide.md: "# Guide"
  empty: ~
"##,
        )
        .unwrap()
        .unwrap();

        assert_eq!(contents_of(&root, "readme.txt"), "top level");
        assert_eq!(contents_of(&root, "docs/guide.md"), "# Guide");
        let empty = root.query("docs/empty").unwrap();
        assert!(empty.is_directory());
        assert_eq!(empty.length(), Some(0));
    }

    #[test]
    fn slash_keys_create_intermediate_directories() {
        let root = parse(
            r#"
"a/b/c.txt": "deep"
"a/d.txt": "shallow"
"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(contents_of(&root, "a/b/c.txt"), "deep");
        assert_eq!(contents_of(&root, "a/d.txt"), "shallow");
        assert_eq!(root.list().len(), 1);
    }

    #[test]
    fn scalar_values_are_written_as_text() {
        let root = parse("answer: 42\nenabled: true\n").unwrap().unwrap();
        assert_eq!(contents_of(&root, "answer"), "42");
        assert_eq!(contents_of(&root, "enabled"), "true");
    }

    #[test]
    fn entries_under_files_are_skipped() {
        let root = parse("blocker: \"file\"\n\"blocker/inner\": \"x\"\n")
            .unwrap()
            .unwrap();
        assert!(root.query("blocker/inner").is_none());
        assert_eq!(contents_of(&root, "blocker"), "file");
    }

    #[test]
    fn empty_document_yields_nothing() {
        assert!(parse("").unwrap().is_none());
    }

    #[test]
    fn non_mapping_top_level_is_malformed() {
        assert!(matches!(
            parse("- item1\n- item2"),
            Err(IdentifyError::MalformedError { .. })
        ));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        assert!(matches!(
            parse("invalid: yaml: content: [unclosed"),
            Err(IdentifyError::ParseError { .. })
        ));
    }

    #[test]
    fn identify_ignores_other_files() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        writeln!(temp_file, "a: b").expect("Failed to write to temp file");
        let handler = ManifestHandler::default();
        assert!(handler.identify(temp_file.path()).unwrap().is_none());
    }

    #[test]
    fn identify_reads_matching_files() {
        let mut temp_file = tempfile::Builder::new()
            .suffix(".vfs.yaml")
            .tempfile()
            .expect("Failed to create temp file");
        writeln!(temp_file, "hello.txt: \"from manifest\"").expect("Failed to write to temp file");

        let root = ManifestHandler::default()
            .identify(temp_file.path())
            .unwrap()
            .unwrap();
        assert_eq!(contents_of(&root, "hello.txt"), "from manifest");
    }
}
