//! Static per-table metadata: keys, references and existence policy.
//!
//! The catalog is defined once (YAML file), validated for referential
//! consistency at load time and read-only afterwards. Missing-FK-target
//! mistakes are caught here rather than surfacing as ALTER TABLE failures
//! halfway through a load.

use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Policy when the physical table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfExists {
    /// Drop and recreate.
    #[default]
    Replace,

    /// Insert into the existing table; it must already exist.
    Append,

    /// Error if the table already exists.
    Fail,
}

/// A foreign key reference: local column -> target table/column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Logical name of the referenced table (catalog key, pre-transform).
    pub table: String,

    /// Referenced column name.
    pub column: String,
}

/// Metadata for one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableMeta {
    /// Primary key column names, in declared order. Empty means no PK.
    #[serde(default)]
    pub primary_keys: Vec<String>,

    /// Local column name -> referenced table/column.
    #[serde(default)]
    pub foreign_keys: BTreeMap<String, ForeignKeyRef>,

    /// Existence policy (default: replace).
    #[serde(default)]
    pub if_exists: IfExists,
}

/// The table metadata catalog, keyed by logical (pre-transform) table name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tables: BTreeMap<String, TableMeta>,
}

impl Catalog {
    /// Load a catalog from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a catalog from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let catalog: Catalog = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check referential consistency: every foreign key must name a
    /// non-empty local column and point at another catalog entry.
    pub fn validate(&self) -> Result<()> {
        for (name, meta) in &self.tables {
            if meta.primary_keys.iter().any(|c| c.is_empty()) {
                return Err(EtlError::Config(format!(
                    "catalog entry '{}' has an empty primary key column",
                    name
                )));
            }
            for (column, fk) in &meta.foreign_keys {
                if column.is_empty() || fk.column.is_empty() {
                    return Err(EtlError::Config(format!(
                        "catalog entry '{}' has a foreign key with an empty column name",
                        name
                    )));
                }
                if !self.tables.contains_key(&fk.table) {
                    return Err(EtlError::Config(format!(
                        "catalog entry '{}' column '{}' references unknown table '{}'",
                        name, column, fk.table
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up metadata by logical table name.
    pub fn get(&self, logical: &str) -> Option<&TableMeta> {
        self.tables.get(logical)
    }
}

/// Map a logical dataset name to the physical table identifier by stripping
/// one leading `df_` prefix. Applied identically to a table's own name and
/// to every foreign key target so references resolve.
pub fn physical_name(logical: &str) -> String {
    logical.strip_prefix("df_").unwrap_or(logical).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_YAML: &str = r#"
tables:
  df_users:
    primary_keys: [user_id]
  df_profiles:
    primary_keys: [profile_id]
    foreign_keys:
      user_id: { table: df_users, column: user_id }
  df_content_people:
    primary_keys: [content_id, person_id, role]
    if_exists: append
"#;

    #[test]
    fn test_physical_name_strips_prefix() {
        assert_eq!(physical_name("df_users"), "users");
        assert_eq!(physical_name("users"), "users");
        // Only one leading prefix is stripped, nothing inside the name.
        assert_eq!(physical_name("df_df_users"), "df_users");
        assert_eq!(physical_name("my_df_users"), "my_df_users");
    }

    #[test]
    fn test_parse_catalog() {
        let catalog = Catalog::from_yaml(CATALOG_YAML).unwrap();
        assert_eq!(catalog.tables.len(), 3);

        let profiles = catalog.get("df_profiles").unwrap();
        assert_eq!(profiles.primary_keys, vec!["profile_id"]);
        assert_eq!(profiles.foreign_keys["user_id"].table, "df_users");
        assert_eq!(profiles.if_exists, IfExists::Replace);

        let junction = catalog.get("df_content_people").unwrap();
        assert_eq!(junction.primary_keys.len(), 3);
        assert_eq!(junction.if_exists, IfExists::Append);
    }

    #[test]
    fn test_unknown_fk_target_rejected() {
        let yaml = r#"
tables:
  df_plays:
    foreign_keys:
      user_id: { table: df_users, column: user_id }
"#;
        let err = Catalog::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("df_users"));
    }

    #[test]
    fn test_empty_pk_column_rejected() {
        let yaml = r#"
tables:
  df_users:
    primary_keys: [""]
"#;
        assert!(Catalog::from_yaml(yaml).is_err());
    }
}
