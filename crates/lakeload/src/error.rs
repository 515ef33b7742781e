//! Error types for the ETL library.

use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Configuration error (invalid YAML, missing env vars, bad threshold).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Object storage error (listing, reading or writing the bucket).
    #[error("Object storage error: {0}")]
    Storage(#[from] object_store::Error),

    /// File extension with no registered decoder.
    #[error("Unsupported file format: '{0}'")]
    UnsupportedFormat(String),

    /// Structural problem in tabular data (ragged columns, non-tabular JSON,
    /// arrow type with no frame representation).
    #[error("Schema error: {0}")]
    Schema(String),

    /// CSV decode error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Excel workbook decode error.
    #[error("Excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// Arrow conversion error.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet encode/decode error.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Warehouse connection or statement error.
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] tokio_postgres::Error),

    /// Connection pool error.
    #[error("Pool error: {0}")]
    Pool(String),

    /// Table materialization failed.
    #[error("Load failed for table {table}: {message}")]
    Load { table: String, message: String },

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    /// Create a Load error for a specific table.
    pub fn load(table: impl Into<String>, message: impl Into<String>) -> Self {
        EtlError::Load {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, EtlError>;
