use std::path::PathBuf;

use serde::Deserialize;

/// Literal path that selects standard output instead of a file.
pub const STDOUT_TARGET: &str = "-";

/// Where an output stream is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// The process standard output.
    Stdout,
    /// A file created (or truncated) at the given path.
    File(PathBuf),
}

impl OutputTarget {
    /// Interprets a configured path, mapping [`STDOUT_TARGET`] to [`OutputTarget::Stdout`].
    pub fn parse(value: &str) -> Self {
        if value == STDOUT_TARGET {
            OutputTarget::Stdout
        } else {
            OutputTarget::File(PathBuf::from(value))
        }
    }
}

/// Output file locations for an export run.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Destination of the bulk data stream.
    #[serde(default = "default_data_file")]
    pub data: String,
    /// Destination of the inferred mapping document.
    #[serde(default = "default_mapping_file")]
    pub mapping: String,
}

impl FilesConfig {
    /// Default data output path.
    pub const DEFAULT_DATA_FILE: &'static str = "data.json";

    /// Default mapping output path.
    pub const DEFAULT_MAPPING_FILE: &'static str = "mapping.json";

    /// Returns the target of the bulk data stream.
    pub fn data_target(&self) -> OutputTarget {
        OutputTarget::parse(&self.data)
    }

    /// Returns the target of the mapping document.
    pub fn mapping_target(&self) -> OutputTarget {
        OutputTarget::parse(&self.mapping)
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            data: default_data_file(),
            mapping: default_mapping_file(),
        }
    }
}

fn default_data_file() -> String {
    FilesConfig::DEFAULT_DATA_FILE.to_string()
}

fn default_mapping_file() -> String {
    FilesConfig::DEFAULT_MAPPING_FILE.to_string()
}
