use compio::{fs::File, io::AsyncReadExt, io::BufReader};
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use std::{io::Cursor, num::NonZeroUsize, path::Path};
use tracing::debug;

use crate::ext::BestEffortPathExt;
use crate::ingest::DEFAULT_MANIFEST_SUFFIX;

/// Settings read from the optional YAML config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsConfig {
    /// Worker pool size; `None` picks one per core.
    pub workers: Option<NonZeroUsize>,
    pub manifest_suffix: String,
    pub virtual_checksums: bool,
    pub hide_dotfiles: bool,
    pub read_only: bool,
    /// In-memory entries attached to the root after ingestion. `None` content
    /// is a directory.
    pub mocks: Vec<(String, Option<String>)>,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            workers: None,
            manifest_suffix: DEFAULT_MANIFEST_SUFFIX.to_string(),
            virtual_checksums: true,
            hide_dotfiles: false,
            read_only: false,
            mocks: Vec::new(),
        }
    }
}

impl VfsConfig {
    pub async fn read(path: &Path) -> Result<Self, ConfigError> {
        debug!("Opening config file: {}", path.best_effort_path_display());
        let file = File::open(path).await.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;

        let cursor = Cursor::new(file);
        let mut reader = BufReader::new(cursor);
        let res = reader.read_to_string(String::new()).await;
        match res.0 {
            Ok(n) => debug!("Successfully read config file: {n} bytes"),
            _ => {
                res.0.context(ReadSnafu {
                    file_path: path.best_effort_path_display(),
                })?;
            }
        }
        res.1.as_str().try_into()
    }

    fn apply(&mut self, key: &str, value: &Yaml) -> Result<(), ConfigError> {
        match key {
            "workers" => {
                let workers = integer(value)
                    .and_then(|n| usize::try_from(n).ok())
                    .and_then(NonZeroUsize::new)
                    .context(InvalidValueSnafu {
                        key,
                        expected: "a positive integer",
                    })?;
                self.workers = Some(workers);
            }
            "manifest_suffix" => {
                let suffix = value
                    .as_str()
                    .filter(|suffix| !suffix.is_empty())
                    .context(InvalidValueSnafu {
                        key,
                        expected: "a non-empty string",
                    })?;
                self.manifest_suffix = suffix.to_string();
            }
            "virtual_checksums" => self.virtual_checksums = flag(key, value)?,
            "hide_dotfiles" => self.hide_dotfiles = flag(key, value)?,
            "read_only" => self.read_only = flag(key, value)?,
            "mocks" => self.mocks = Self::parse_mocks(value)?,
            other => debug!("Ignoring unknown config key '{}'", other),
        }
        Ok(())
    }

    fn parse_mocks(value: &Yaml) -> Result<Vec<(String, Option<String>)>, ConfigError> {
        let empty = LinkedHashMap::new();
        let entries = match value {
            Yaml::Value(Scalar::Null) => &empty,
            other => other.as_mapping().context(InvalidValueSnafu {
                key: "mocks",
                expected: "a map of paths",
            })?,
        };

        entries
            .iter()
            .map(|(path, contents)| -> Result<_, ConfigError> {
                let path = path.as_str().context(InvalidValueSnafu {
                    key: "mocks",
                    expected: "string paths",
                })?;
                let contents = match contents {
                    Yaml::Value(Scalar::Null) => None,
                    other => Some(
                        other
                            .as_str()
                            .context(InvalidValueSnafu {
                                key: format!("mocks.{path}"),
                                expected: "string content or null",
                            })?
                            .to_string(),
                    ),
                };
                Ok((path.to_string(), contents))
            })
            .collect()
    }
}

fn integer(value: &Yaml) -> Option<i64> {
    match value {
        Yaml::Value(Scalar::Integer(n)) => Some(*n),
        _ => None,
    }
}

fn flag(key: &str, value: &Yaml) -> Result<bool, ConfigError> {
    match value {
        Yaml::Value(Scalar::Boolean(flag)) => Ok(*flag),
        _ => InvalidValueSnafu {
            key,
            expected: "true or false",
        }
        .fail(),
    }
}

impl TryFrom<&str> for VfsConfig {
    type Error = ConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let contents_vec =
            Yaml::load_from_str(contents).map_err(|e| ConfigError::ParseError { source: e })?;
        let mut config = VfsConfig::default();
        let Some(contents) = contents_vec.first() else {
            return Ok(config);
        };
        if matches!(contents, Yaml::Value(Scalar::Null)) {
            return Ok(config);
        }

        let top_level = contents.as_mapping().ok_or(ConfigError::TopLevelNotMap)?;
        for (key, value) in top_level {
            match key.as_str() {
                Some(key) => config.apply(key, value)?,
                None => debug!("Skipping invalid config entry: {:?}", key),
            }
        }

        Ok(config)
    }
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Config key '{}' should be {}", key, expected))]
    InvalidValue { key: String, expected: String },
}
