//! # lakeload
//!
//! Object-storage-to-PostgreSQL ETL pipeline library.
//!
//! This library implements a four-stage pipeline over a bronze/silver
//! object storage layout:
//!
//! - **Extract**: decode tabular files (CSV, JSON, parquet, feather) from
//!   the bronze prefix into in-memory frames
//! - **Clean**: deduplicate rows, classify date-like text columns by parse
//!   frequency, and fill nulls per column type
//! - **Silver sink**: persist cleaned datasets as snappy-compressed parquet
//! - **Load**: bulk insert into PostgreSQL via COPY, then attach primary
//!   and foreign keys in a second pass
//!
//! ## Example
//!
//! ```rust,no_run
//! use lakeload::{Catalog, Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> lakeload::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let catalog = Catalog::load("catalog.yaml")?;
//!     let pipeline = Pipeline::connect(config, catalog).await?;
//!     let result = pipeline.run().await?;
//!     println!("{}", result.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod clean;
pub mod config;
pub mod error;
pub mod frame;
pub mod load;
pub mod pipeline;
pub mod storage;
pub mod target;

// Re-exports for convenient access
pub use catalog::{physical_name, Catalog, ForeignKeyRef, IfExists, TableMeta};
pub use clean::clean;
pub use config::{Config, PipelineConfig, StorageConfig, WarehouseConfig};
pub use error::{EtlError, Result};
pub use frame::{Column, ColumnType, Frame, FrameSet, Value};
pub use load::{ConstraintKind, ConstraintOutcome, LoadReport, TableOutcome};
pub use pipeline::{EtlResult, Pipeline};
pub use storage::BlobStore;
pub use target::{PgWarehouse, Warehouse};
