use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;
use crate::shared::ValidationError;

/// Directory holding the configuration files, relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Extensions tried, in order, for every configuration file.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

const BASE_FILE_STEM: &str = "base";

/// Prefix of environment variable overrides, e.g. `APP_CAPTURE_ID`.
const ENV_PREFIX: &str = "APP";

/// Separator between nested keys in environment variables, e.g. `APP_PROCESSOR__RESOLVE_INTERVAL_MS`.
const ENV_SEPARATOR: &str = "__";

/// A configuration that can be loaded with [`load_config`].
pub trait Config: DeserializeOwned {
    /// Checks constraints serde cannot express. Called once everything is merged.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Errors returned while loading a configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("no `{stem}` configuration file in `{directory}`")]
    ConfigurationFileMissing { stem: String, directory: PathBuf },

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] io::Error),

    #[error("failed to build configuration: {0}")]
    Builder(#[source] rust_cli_config::ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

/// Loads and validates a configuration from `configuration/` under the current directory.
///
/// Layers, last one wins: `base.*`, then `{environment}.*` selected by `APP_ENVIRONMENT`, then
/// `APP_`-prefixed environment variables.
pub fn load_config<T: Config>() -> Result<T, LoadConfigError> {
    let current_dir = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    load_config_from(&current_dir.join(CONFIGURATION_DIR))
}

/// Same as [`load_config`] but reads the files from `directory`.
pub fn load_config_from<T: Config>(directory: &Path) -> Result<T, LoadConfigError> {
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            directory.to_path_buf(),
        ));
    }

    let environment = Environment::load().map_err(LoadConfigError::Environment)?;
    let base_file = find_configuration_file(directory, BASE_FILE_STEM)?;
    let environment_file = find_configuration_file(directory, environment.as_str())?;

    let config: T = rust_cli_config::Config::builder()
        .add_source(rust_cli_config::File::from(base_file))
        .add_source(rust_cli_config::File::from(environment_file))
        .add_source(
            rust_cli_config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR),
        )
        .build()
        .and_then(|settings| settings.try_deserialize())
        .map_err(LoadConfigError::Builder)?;

    config.validate()?;

    Ok(config)
}

fn find_configuration_file(directory: &Path, stem: &str) -> Result<PathBuf, LoadConfigError> {
    CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .find(|path| path.is_file())
        .ok_or_else(|| LoadConfigError::ConfigurationFileMissing {
            stem: stem.to_string(),
            directory: directory.to_path_buf(),
        })
}
