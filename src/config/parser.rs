//! Configuration parser for loading engine settings.
//!
//! Settings come from a YAML file, then environment variables, with the
//! environment taking precedence.

use crate::error::{ConfigError, EngineError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::settings::EngineConfig;

/// Environment variable overriding `max_concurrency`.
pub const ENV_MAX_CONCURRENCY: &str = "KUSION_MAX_CONCURRENCY";
/// Environment variable overriding `ignore_fields`, comma separated.
pub const ENV_IGNORE_FIELDS: &str = "KUSION_IGNORE_FIELDS";
/// Environment variable overriding `release_dir`.
pub const ENV_RELEASE_DIR: &str = "KUSION_RELEASE_DIR";

/// Configuration parser for loading engine settings.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<EngineConfig> {
        let path = self.resolve(path.as_ref());
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(EngineError::Config(ConfigError::FileNotFound { path }));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            EngineError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(&path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a value fails validation.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<EngineConfig> {
        debug!("Parsing YAML configuration");

        let mut config: EngineConfig = if content.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                let location = source.map(|p| p.display().to_string());
                EngineError::Config(ConfigError::ParseError {
                    message: format!("YAML parse error: {e}"),
                    location,
                })
            })?
        };

        if config.release_dir.is_relative()
            && let Some(base) = &self.base_path
        {
            config.release_dir = base.join(&config.release_dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Environment variables are checked in the format `KUSION_<KEY>`
    /// (e.g., `KUSION_MAX_CONCURRENCY`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// is invalid.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<EngineConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_overrides(&mut config, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Builds configuration from defaults and the environment alone.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is invalid.
    pub fn from_env(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::default();
        Self::apply_overrides(&mut config, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides looked up through `lookup`.
    fn apply_overrides(
        config: &mut EngineConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<(), ConfigError> {
        if let Some(raw) = lookup(ENV_MAX_CONCURRENCY) {
            debug!("Overriding max_concurrency from environment");
            config.max_concurrency = raw.trim().parse().map_err(|e| {
                ConfigError::validation(format!("invalid value '{raw}': {e}"), ENV_MAX_CONCURRENCY)
            })?;
        }

        if let Some(raw) = lookup(ENV_IGNORE_FIELDS) {
            debug!("Overriding ignore_fields from environment");
            config.ignore_fields = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(dir) = lookup(ENV_RELEASE_DIR) {
            debug!("Overriding release_dir from environment");
            config.release_dir = PathBuf::from(dir);
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                EngineError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}
