//! Schema-constrained bulk loader.
//!
//! Two-phase protocol: materialize every table first (bulk insert is
//! fastest against a constraint-free table, and a foreign key cannot
//! reference a table that does not exist yet), then attach constraints in
//! a second pass over the catalog. Each table and each constraint is an
//! independent unit of work; failures are recorded in the report and never
//! abort the run.

use crate::catalog::{physical_name, Catalog, IfExists};
use crate::error::{EtlError, Result};
use crate::frame::{Frame, FrameSet};
use crate::target::Warehouse;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Outcome of one table materialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableOutcome {
    /// Dataset name as it appears in the collection.
    pub logical: String,

    /// Physical table name after the prefix transform.
    pub physical: String,

    /// Rows inserted (0 when the table failed).
    pub rows: u64,

    /// Error detail when materialization failed.
    pub error: Option<String>,
}

/// Which constraint a [`ConstraintOutcome`] refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey { column: String },
}

/// Outcome of one constraint attachment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintOutcome {
    /// Physical table the constraint was attached to.
    pub table: String,

    #[serde(flatten)]
    pub kind: ConstraintKind,

    /// Error detail when the attachment failed.
    pub error: Option<String>,
}

/// Per-item report of a load run. The load call itself succeeds even when
/// entries here carry errors; callers decide what partial application
/// means for them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadReport {
    pub tables: Vec<TableOutcome>,
    pub constraints: Vec<ConstraintOutcome>,
}

impl LoadReport {
    /// Names of tables whose materialization failed.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.error.is_some())
            .map(|t| t.physical.as_str())
            .collect()
    }

    /// Number of constraints that failed to attach.
    pub fn failed_constraints(&self) -> usize {
        self.constraints.iter().filter(|c| c.error.is_some()).count()
    }

    /// True when every table and every constraint applied cleanly.
    pub fn is_complete(&self) -> bool {
        self.tables.iter().all(|t| t.error.is_none())
            && self.constraints.iter().all(|c| c.error.is_none())
    }
}

/// Load a cleaned dataset collection into the warehouse.
pub async fn load(
    frames: &FrameSet,
    catalog: &Catalog,
    warehouse: &dyn Warehouse,
) -> Result<LoadReport> {
    let mut report = LoadReport::default();

    // Phase 1: materialize every dataset. Order does not matter here;
    // constraints are deferred, so there are no inter-table dependencies.
    for (logical, frame) in frames {
        let physical = physical_name(logical);
        let policy = catalog
            .get(logical)
            .map(|meta| meta.if_exists)
            .unwrap_or_default();

        match materialize(warehouse, &physical, frame, policy).await {
            Ok(rows) => {
                info!("Table '{}' created ({} rows, from '{}')", physical, rows, logical);
                report.tables.push(TableOutcome {
                    logical: logical.clone(),
                    physical,
                    rows,
                    error: None,
                });
            }
            Err(e) => {
                error!("Failed to materialize table '{}': {}", physical, e);
                report.tables.push(TableOutcome {
                    logical: logical.clone(),
                    physical,
                    rows: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    // Phase 2: attach constraints, iterating the catalog but skipping
    // entries that were not part of this run's input.
    for (logical, meta) in &catalog.tables {
        if !frames.contains_key(logical) {
            debug!("Catalog entry '{}' not in input collection, skipping", logical);
            continue;
        }
        let physical = physical_name(logical);

        if !meta.primary_keys.is_empty() {
            let error = warehouse
                .add_primary_key(&physical, &meta.primary_keys)
                .await
                .err();
            match &error {
                None => info!("Primary key added to table '{}'", physical),
                Some(e) => error!("Failed to add primary key to '{}': {}", physical, e),
            }
            report.constraints.push(ConstraintOutcome {
                table: physical.clone(),
                kind: ConstraintKind::PrimaryKey,
                error: error.map(|e| e.to_string()),
            });
        }

        for (column, fk) in &meta.foreign_keys {
            let ref_table = physical_name(&fk.table);
            let error = warehouse
                .add_foreign_key(&physical, column, &ref_table, &fk.column)
                .await
                .err();
            match &error {
                None => info!(
                    "Foreign key added to table '{}' (column: {})",
                    physical, column
                ),
                Some(e) => error!(
                    "Failed to add foreign key to '{}.{}': {}",
                    physical, column, e
                ),
            }
            report.constraints.push(ConstraintOutcome {
                table: physical.clone(),
                kind: ConstraintKind::ForeignKey {
                    column: column.clone(),
                },
                error: error.map(|e| e.to_string()),
            });
        }
    }

    info!(
        "Load complete: {}/{} tables, {}/{} constraints",
        report.tables.iter().filter(|t| t.error.is_none()).count(),
        report.tables.len(),
        report.constraints.len() - report.failed_constraints(),
        report.constraints.len()
    );

    Ok(report)
}

async fn materialize(
    warehouse: &dyn Warehouse,
    physical: &str,
    frame: &Frame,
    policy: IfExists,
) -> Result<u64> {
    match policy {
        IfExists::Replace => {
            if warehouse.table_exists(physical).await? {
                warehouse.drop_table(physical).await?;
            }
            warehouse.create_with_rows(physical, frame).await
        }
        IfExists::Append => {
            if !warehouse.table_exists(physical).await? {
                return Err(EtlError::load(
                    physical,
                    "if_exists=append requires a pre-existing table",
                ));
            }
            warehouse.append_rows(physical, frame).await
        }
        IfExists::Fail => {
            if warehouse.table_exists(physical).await? {
                return Err(EtlError::load(
                    physical,
                    "table already exists and if_exists=fail",
                ));
            }
            warehouse.create_with_rows(physical, frame).await
        }
    }
}
