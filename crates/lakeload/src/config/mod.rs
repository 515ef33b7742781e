//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{EtlError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the process environment.
    ///
    /// Reads the same variable names the original deployment used
    /// (`AWS_S3_BUCKET`, `AWS_S3_BRONZE_FOLDER`, `DB_HOST`, ...), but the
    /// result is an explicit struct passed by reference into the core;
    /// nothing inside the pipeline reads the environment.
    pub fn from_env() -> Result<Self> {
        let config = Config {
            storage: StorageConfig {
                bucket: require_env("AWS_S3_BUCKET")?,
                region: optional_env("AWS_DEFAULT_REGION").unwrap_or_else(|| "us-east-1".into()),
                bronze_prefix: optional_env("AWS_S3_BRONZE_FOLDER").unwrap_or_default(),
                silver_prefix: optional_env("AWS_S3_SILVER_FOLDER").unwrap_or_default(),
                access_key_id: optional_env("AWS_ACCESS_KEY_ID"),
                secret_access_key: optional_env("AWS_SECRET_ACCESS_KEY"),
            },
            warehouse: WarehouseConfig {
                host: require_env("DB_HOST")?,
                port: match optional_env("DB_PORT") {
                    Some(raw) => raw
                        .parse()
                        .map_err(|_| EtlError::Config(format!("DB_PORT is not a port: '{raw}'")))?,
                    None => 5432,
                },
                database: require_env("DB_NAME")?,
                user: require_env("DB_USER")?,
                password: require_env("DB_PASSWORD")?,
                max_connections: 4,
            },
            pipeline: PipelineConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

fn require_env(name: &str) -> Result<String> {
    optional_env(name).ok_or_else(|| EtlError::Config(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}
