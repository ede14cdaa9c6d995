//! Configuration management for snowsample.
//!
//! Handles loading configuration from a TOML file. Every section is optional;
//! a missing file yields the defaults, and CLI flags are applied on top.

use crate::error::{Result, SnowsampleError};
use crate::provision::{self, ProductSpec};
use crate::query::DEFAULT_ROW_LIMIT;
use crate::secrets::CredentialNames;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub drivers: DriversConfig,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

/// Where drivers come from and where they are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriversConfig {
    /// Local directory holding the driver jars.
    #[serde(default = "default_drivers_dir")]
    pub dir: PathBuf,

    /// Maven repository root.
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Group id the products are published under.
    #[serde(default = "default_group")]
    pub group: String,

    /// Products to keep up to date.
    #[serde(default = "provision::default_products")]
    pub products: Vec<ProductSpec>,
}

fn default_drivers_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snowsample")
        .join("drivers")
}

fn default_repository() -> String {
    provision::DEFAULT_REPOSITORY.to_string()
}

fn default_group() -> String {
    provision::DEFAULT_GROUP.to_string()
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            dir: default_drivers_dir(),
            repository: default_repository(),
            group: default_group(),
            products: provision::default_products(),
        }
    }
}

/// Fixed settings of the local session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Run mode; only single-process local modes are accepted.
    #[serde(default = "default_master")]
    pub master: String,

    /// Display name of the session.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Supporting library paths appended after the driver jars.
    #[serde(default)]
    pub extra_class_path: Vec<String>,

    /// Additional free-form session settings.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

fn default_master() -> String {
    "local".to_string()
}

fn default_app_name() -> String {
    "snowsample".to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            master: default_master(),
            app_name: default_app_name(),
            extra_class_path: Vec::new(),
            settings: BTreeMap::new(),
        }
    }
}

/// Secret store location and parameter names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// AWS region of the parameter store.
    #[serde(default = "default_region")]
    pub region: String,

    /// Overrides the regional endpoint (e.g. for a VPC endpoint).
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub names: CredentialNames,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            names: CredentialNames::default(),
        }
    }
}

/// The sampled table and the row limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Fully qualified source table holding the variant column.
    #[serde(default = "default_table")]
    pub table: String,

    /// Maximum number of rows pulled into memory.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Data source format used for the read.
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_table() -> String {
    "snowflake_sample_data.weather.weather_14_total".to_string()
}

fn default_limit() -> usize {
    DEFAULT_ROW_LIMIT
}

fn default_format() -> String {
    crate::source::SNOWFLAKE_FORMAT.to_string()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            limit: default_limit(),
            format: default_format(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("snowsample")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file; a missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SnowsampleError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            SnowsampleError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.query.limit == 0 {
            return Err(SnowsampleError::config("query.limit must be greater than 0"));
        }
        if self.drivers.products.is_empty() {
            return Err(SnowsampleError::config(
                "drivers.products must name at least one product",
            ));
        }
        if self.secrets.region.trim().is_empty() {
            return Err(SnowsampleError::config("secrets.region must not be empty"));
        }
        Ok(())
    }
}
