use std::path::{Path, PathBuf};

use config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// File extensions accepted by [`load_config`].
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

// `APP_CONNECTION__HOST` overrides `connection.host`.
const ENV_PREFIX: &str = "APP";
const ENV_PREFIX_SEPARATOR: &str = "_";
const ENV_SEPARATOR: &str = "__";
const LIST_SEPARATOR: &str = ",";

/// Configuration roots loadable with [`load_config`].
pub trait Config {
    /// Dotted keys whose environment values are comma-separated lists.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Failure to load a configuration file.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// The configuration file does not exist or is not a regular file.
    #[error("could not open config file `{0}`")]
    ConfigurationFileMissing(PathBuf),

    /// The configuration file has an extension that is not supported.
    #[error("unsupported config file extension for `{path}`; expected one of: {expected}")]
    UnsupportedExtension { path: PathBuf, expected: String },

    /// The configuration file existed but could not be parsed.
    #[error("failed to load configuration from `{path}`: {source}")]
    ConfigurationFileLoad {
        path: PathBuf,
        source: config::ConfigError,
    },

    /// Failed to build the layered configuration.
    #[error("failed to merge environment overrides: {0}")]
    Builder(#[source] config::ConfigError),

    /// The configuration file was parsed but deserialization failed.
    #[error("configuration does not match the expected shape: {0}")]
    Deserialization(#[source] config::ConfigError),
}

/// Loads configuration from `path` and applies environment-variable overrides.
///
/// The file format is inferred from the extension (`yaml`, `yml` or `json`). Values from
/// `APP_`-prefixed environment variables are layered on top; nested keys use double underscores
/// (`APP_CONNECTION__HOST`) and list values are comma-separated.
pub fn load_config<T>(path: &Path) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !path.is_file() {
        return Err(LoadConfigError::ConfigurationFileMissing(
            path.to_path_buf(),
        ));
    }

    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or_default();
    if !CONFIG_FILE_EXTENSIONS.contains(&extension) {
        return Err(LoadConfigError::UnsupportedExtension {
            path: path.to_path_buf(),
            expected: CONFIG_FILE_EXTENSIONS.join(", "),
        });
    }

    let mut environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true);

    if !T::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source.list_separator(LIST_SEPARATOR);

        for key in <T as Config>::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let builder = config::Config::builder().add_source(config::File::from(path.to_path_buf()));
    validate_configuration_source(&builder, path)?;

    let settings = builder
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

/// Builds the file source alone so that parse errors point at the file instead of the merge.
fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            path: path.to_path_buf(),
            source,
        })
        .map(|_| ())
}
