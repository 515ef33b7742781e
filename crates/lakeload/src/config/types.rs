//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Object storage (bronze/silver tiers).
    pub storage: StorageConfig,

    /// Target relational warehouse (PostgreSQL).
    pub warehouse: WarehouseConfig,

    /// Pipeline behavior.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Object storage configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// S3 bucket name.
    pub bucket: String,

    /// AWS region (default: us-east-1).
    #[serde(default = "default_region")]
    pub region: String,

    /// Prefix holding raw source files.
    #[serde(default)]
    pub bronze_prefix: String,

    /// Prefix receiving cleaned parquet files.
    #[serde(default)]
    pub silver_prefix: String,

    /// Access key id. Falls back to the ambient AWS environment when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    /// Secret access key. Falls back to the ambient AWS environment when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("bronze_prefix", &self.bronze_prefix)
            .field("silver_prefix", &self.silver_prefix)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Target warehouse (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl std::fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Pipeline behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum parse-success fraction for a text column to be classified
    /// as a date column (default: 0.1).
    #[serde(default = "default_date_threshold")]
    pub date_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            date_threshold: default_date_threshold(),
        }
    }
}

// Default value functions for serde
fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_max_connections() -> usize {
    4
}

fn default_date_threshold() -> f64 {
    0.1
}
