//! Configuration Loader
//!
//! Environment-aware loading: defaults, then an optional TOML file, then environment
//! variables prefixed `DAGFLOW__` (double underscore separates sections and keys).

use super::error::{ConfigError, ConfigResult};
use super::DagflowConfig;
use ::config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "DAGFLOW_CONFIG_PATH";

/// Environment variable naming the deployment environment
pub const ENVIRONMENT_ENV: &str = "DAGFLOW_ENV";

const DEFAULT_CONFIG_FILE: &str = "config/dagflow.toml";

/// Loaded configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: DagflowConfig,
    environment: String,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load with auto-discovery: `DAGFLOW_CONFIG_PATH`, else `config/dagflow.toml` when it
    /// exists, else defaults and environment only.
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let path = env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .ok()
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.is_file().then_some(default)
            });

        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::finish(Self::build(None, None)?, None),
        }
    }

    /// Load from a specific TOML file, which must exist
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let config = Self::build(Some(path), None)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(config: DagflowConfig, source: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        info!(
            environment = %environment,
            source = ?source,
            log_level = %config.telemetry.log_level,
            "Configuration loaded successfully"
        );
        Ok(Arc::new(ConfigManager {
            config,
            environment,
            source,
        }))
    }

    /// Layer the sources. `env_override` replaces the process environment (used by tests).
    fn build(
        path: Option<&Path>,
        env_override: Option<HashMap<String, String>>,
    ) -> ConfigResult<DagflowConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&DagflowConfig::default())?);

        if let Some(path) = path {
            debug!(path = %path.display(), "Reading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("DAGFLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env_override),
        );

        let config: DagflowConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &DagflowConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// File the configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Detect the deployment environment, defaulting to `development`
    pub fn detect_environment() -> String {
        env::var(ENVIRONMENT_ENV).unwrap_or_else(|_| "development".to_string())
    }
}
