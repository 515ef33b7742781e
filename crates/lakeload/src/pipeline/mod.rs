//! Pipeline orchestration: extract -> clean -> silver sink -> load.

use crate::catalog::Catalog;
use crate::clean::clean;
use crate::config::Config;
use crate::error::Result;
use crate::load::{load, LoadReport};
use crate::storage::{extract, write_silver, BlobStore};
use crate::target::{PgWarehouse, Warehouse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlResult {
    pub run_id: String,
    /// "completed" when everything landed, "partial" otherwise.
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub datasets_extracted: usize,
    pub parquet_written: usize,
    pub tables_total: usize,
    pub tables_loaded: usize,
    pub tables_failed: usize,
    pub constraints_total: usize,
    pub constraints_failed: usize,
    pub failed_tables: Vec<String>,
}

impl EtlResult {
    /// Serialize the result as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The ETL pipeline: holds configuration and connected collaborators and
/// runs the four stages in order.
pub struct Pipeline {
    config: Config,
    catalog: Catalog,
    store: BlobStore,
    warehouse: Arc<dyn Warehouse>,
}

impl Pipeline {
    /// Connect to object storage and the warehouse described by the config.
    pub async fn connect(config: Config, catalog: Catalog) -> Result<Self> {
        let store = BlobStore::s3(&config.storage)?;
        let warehouse = PgWarehouse::connect(&config.warehouse).await?;
        Ok(Self {
            config,
            catalog,
            store,
            warehouse: Arc::new(warehouse),
        })
    }

    /// Build a pipeline around pre-connected collaborators.
    pub fn with_collaborators(
        config: Config,
        catalog: Catalog,
        store: BlobStore,
        warehouse: Arc<dyn Warehouse>,
    ) -> Self {
        Self {
            config,
            catalog,
            store,
            warehouse,
        }
    }

    /// Run the pipeline end to end.
    ///
    /// Degraded-but-recoverable events (an undecodable file, one failed
    /// table or constraint) are reported in the result rather than
    /// returned as errors; only stage-level failures, such as an
    /// unreachable bucket, abort the run.
    pub async fn run(&self) -> Result<EtlResult> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("Starting ETL run {}", run_id);

        info!("Phase 1/4: Extracting datasets from bronze tier");
        let raw = extract(&self.store, &self.config.storage.bronze_prefix).await?;
        if raw.is_empty() {
            warn!("No datasets found under bronze prefix, nothing to do");
        }

        info!("Phase 2/4: Cleaning {} datasets", raw.len());
        let cleaned = clean(&raw, self.config.pipeline.date_threshold)?;

        info!("Phase 3/4: Writing cleaned datasets to silver tier");
        let parquet_written =
            write_silver(&self.store, &self.config.storage.silver_prefix, &cleaned).await?;

        info!("Phase 4/4: Loading {} tables into the warehouse", cleaned.len());
        let report = load(&cleaned, &self.catalog, self.warehouse.as_ref()).await?;

        let completed_at = Utc::now();
        let result = summarize(
            run_id,
            started_at,
            completed_at,
            raw.len(),
            parquet_written,
            &report,
        );
        info!(
            "ETL run {} {} in {:.1}s: {}/{} tables loaded, {} constraint failures",
            result.run_id,
            result.status,
            result.duration_seconds,
            result.tables_loaded,
            result.tables_total,
            result.constraints_failed
        );
        Ok(result)
    }

    /// Close warehouse connections.
    pub async fn shutdown(&self) {
        self.warehouse.close().await;
    }
}

fn summarize(
    run_id: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    datasets_extracted: usize,
    parquet_written: usize,
    report: &LoadReport,
) -> EtlResult {
    let failed_tables: Vec<String> = report
        .failed_tables()
        .into_iter()
        .map(String::from)
        .collect();
    let constraints_failed = report.failed_constraints();
    let status = if report.is_complete() && parquet_written == report.tables.len() {
        "completed"
    } else {
        "partial"
    };

    EtlResult {
        run_id,
        status: status.to_string(),
        started_at,
        completed_at,
        duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
        datasets_extracted,
        parquet_written,
        tables_total: report.tables.len(),
        tables_loaded: report.tables.len() - failed_tables.len(),
        tables_failed: failed_tables.len(),
        constraints_total: report.constraints.len(),
        constraints_failed,
        failed_tables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{ConstraintKind, ConstraintOutcome, TableOutcome};

    fn report(table_errors: &[Option<&str>], constraint_errors: &[Option<&str>]) -> LoadReport {
        LoadReport {
            tables: table_errors
                .iter()
                .enumerate()
                .map(|(i, e)| TableOutcome {
                    logical: format!("df_t{}", i),
                    physical: format!("t{}", i),
                    rows: 1,
                    error: e.map(String::from),
                })
                .collect(),
            constraints: constraint_errors
                .iter()
                .enumerate()
                .map(|(i, e)| ConstraintOutcome {
                    table: format!("t{}", i),
                    kind: ConstraintKind::PrimaryKey,
                    error: e.map(String::from),
                })
                .collect(),
        }
    }

    #[test]
    fn test_summarize_complete() {
        let now = Utc::now();
        let result = summarize("run".into(), now, now, 2, 2, &report(&[None, None], &[None]));
        assert_eq!(result.status, "completed");
        assert_eq!(result.tables_loaded, 2);
        assert_eq!(result.tables_failed, 0);
        assert!(result.failed_tables.is_empty());
    }

    #[test]
    fn test_summarize_partial_on_table_failure() {
        let now = Utc::now();
        let result = summarize(
            "run".into(),
            now,
            now,
            2,
            2,
            &report(&[None, Some("boom")], &[]),
        );
        assert_eq!(result.status, "partial");
        assert_eq!(result.tables_failed, 1);
        assert_eq!(result.failed_tables, vec!["t1"]);
    }

    #[test]
    fn test_summarize_partial_on_constraint_failure() {
        let now = Utc::now();
        let result = summarize(
            "run".into(),
            now,
            now,
            1,
            1,
            &report(&[None], &[Some("violated")]),
        );
        assert_eq!(result.status, "partial");
        assert_eq!(result.constraints_failed, 1);
    }

    #[test]
    fn test_result_serializes_to_json() {
        let now = Utc::now();
        let result = summarize("abc".into(), now, now, 0, 0, &LoadReport::default());
        let json = result.to_json().unwrap();
        assert!(json.contains("\"run_id\": \"abc\""));
        assert!(json.contains("\"status\": \"completed\""));
    }
}
