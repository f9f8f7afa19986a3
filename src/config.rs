use crate::cli::Cli;
use crate::output::DEFAULT_MAX_LISTED;
use crate::schema::SchemaSource;
use crate::validator::{CheckingLevel, ValidationConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub checking: CheckingConfig,
    pub output: OutputConfig,
}

/// What to check and against which schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CheckingConfig {
    pub level: CheckingLevel,
    /// XML Schema replacing the bundled DSPL schema
    pub schema_file: Option<PathBuf>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// List every error and issue
    pub verbose: bool,
    /// Errors and issues listed before the rest are summarized
    pub max_listed: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            max_listed: DEFAULT_MAX_LISTED,
        }
    }
}

impl From<&Config> for ValidationConfig {
    fn from(config: &Config) -> Self {
        Self {
            level: config.checking.level,
            schema: SchemaSource::from_option(config.checking.schema_file.clone()),
            verbose: config.output.verbose,
            max_listed: config.output.max_listed,
        }
    }
}

const CONFIG_NAMES: [&str; 4] = [
    "dspl-validate.toml",
    "dspl-validate.json",
    ".dspl-validate.toml",
    ".dspl-validate.json",
];

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(cli, &SystemEnvProvider).await
    }

    pub async fn load_config_with(cli: &Cli, env: &impl EnvProvider) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            config = Self::load_from_file(config_path).await?;
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = found_config;
        }

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;
        debug!(?config, "configuration loaded");

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find a configuration file in the current directory, then the user config directory
    pub async fn find_config_file() -> Result<Option<Config>> {
        let mut search_dirs = vec![PathBuf::from(".")];
        if let Some(config_dir) = dirs::config_dir() {
            search_dirs.push(config_dir.join("dspl-validate"));
        }
        Self::find_config_file_in(&search_dirs).await
    }

    pub async fn find_config_file_in(search_dirs: &[PathBuf]) -> Result<Option<Config>> {
        for dir in search_dirs {
            for name in &CONFIG_NAMES {
                let path = dir.join(name);
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    debug!(path = %path.display(), "using configuration file");
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }
        Ok(None)
    }

    /// Apply environment variable overrides from `env`
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(level) = env.get("DSPL_VALIDATE_LEVEL") {
            config.checking.level = level.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid DSPL_VALIDATE_LEVEL value: {}", level))
            })?;
        }

        if let Some(schema_file) = env.get("DSPL_VALIDATE_SCHEMA_FILE") {
            config.checking.schema_file = Some(PathBuf::from(schema_file));
        }

        if let Some(verbose) = env.get("DSPL_VALIDATE_VERBOSE") {
            config.output.verbose = verbose.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid DSPL_VALIDATE_VERBOSE value: {}",
                    verbose
                ))
            })?;
        }

        if let Some(max_listed) = env.get("DSPL_VALIDATE_MAX_LISTED") {
            config.output.max_listed = max_listed.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid DSPL_VALIDATE_MAX_LISTED value: {}",
                    max_listed
                ))
            })?;
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(level) = cli.checking_level {
            config.checking.level = level;
        }
        if let Some(schema_file) = &cli.schema_file {
            config.checking.schema_file = Some(schema_file.clone());
        }
        if cli.verbose {
            config.output.verbose = true;
        }
        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.output.max_listed == 0 {
            return Err(ConfigError::Validation(
                "max_listed must be greater than 0".to_string(),
            ));
        }

        if let Some(schema_file) = &config.checking.schema_file
            && !schema_file.is_file()
        {
            return Err(ConfigError::Validation(format!(
                "Schema file does not exist: {}",
                schema_file.display()
            )));
        }

        Ok(())
    }
}
