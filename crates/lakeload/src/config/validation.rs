//! Configuration validation.

use super::Config;
use crate::error::{EtlError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Storage validation
    if config.storage.bucket.is_empty() {
        return Err(EtlError::Config("storage.bucket is required".into()));
    }
    if config.storage.region.is_empty() {
        return Err(EtlError::Config("storage.region is required".into()));
    }

    // Warehouse validation
    if config.warehouse.host.is_empty() {
        return Err(EtlError::Config("warehouse.host is required".into()));
    }
    if config.warehouse.database.is_empty() {
        return Err(EtlError::Config("warehouse.database is required".into()));
    }
    if config.warehouse.user.is_empty() {
        return Err(EtlError::Config("warehouse.user is required".into()));
    }
    if config.warehouse.max_connections == 0 {
        return Err(EtlError::Config(
            "warehouse.max_connections must be at least 1".into(),
        ));
    }

    // Pipeline validation
    let threshold = config.pipeline.date_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(EtlError::Config(format!(
            "pipeline.date_threshold must be within [0, 1], got {}",
            threshold
        )));
    }

    Ok(())
}
