//! End-to-end pipeline test against an in-memory object store and a
//! scripted warehouse double.

use async_trait::async_trait;
use bytes::Bytes;
use lakeload::storage::arrow::from_parquet_bytes;
use lakeload::{
    BlobStore, Catalog, ColumnType, Config, EtlError, Frame, Pipeline, Result, Value, Warehouse,
};
use object_store::memory::InMemory;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingWarehouse {
    tables: Mutex<BTreeMap<String, (Frame, u64)>>,
    constraints: Mutex<Vec<String>>,
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.lock().unwrap().contains_key(table))
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.tables.lock().unwrap().remove(table);
        Ok(())
    }

    async fn create_with_rows(&self, table: &str, frame: &Frame) -> Result<u64> {
        let rows = frame.row_count() as u64;
        let mut tables = self.tables.lock().unwrap();
        if tables.contains_key(table) {
            return Err(EtlError::load(table, "relation already exists"));
        }
        tables.insert(table.to_string(), (frame.clone(), rows));
        Ok(rows)
    }

    async fn append_rows(&self, table: &str, frame: &Frame) -> Result<u64> {
        let rows = frame.row_count() as u64;
        self.tables
            .lock()
            .unwrap()
            .get_mut(table)
            .ok_or_else(|| EtlError::load(table, "relation does not exist"))?
            .1 += rows;
        Ok(rows)
    }

    async fn add_primary_key(&self, table: &str, columns: &[String]) -> Result<()> {
        if !self.tables.lock().unwrap().contains_key(table) {
            return Err(EtlError::load(table, "relation does not exist"));
        }
        self.constraints
            .lock()
            .unwrap()
            .push(format!("pk:{}:{}", table, columns.join("+")));
        Ok(())
    }

    async fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        ref_table: &str,
        ref_column: &str,
    ) -> Result<()> {
        if !self.tables.lock().unwrap().contains_key(ref_table) {
            return Err(EtlError::load(table, "referenced relation does not exist"));
        }
        self.constraints
            .lock()
            .unwrap()
            .push(format!("fk:{}.{}:{}.{}", table, column, ref_table, ref_column));
        Ok(())
    }

    async fn close(&self) {}
}

fn test_config() -> Config {
    Config::from_yaml(
        r#"
storage:
  bucket: unit-test
  bronze_prefix: bronze
  silver_prefix: silver
warehouse:
  host: localhost
  database: test
  user: test
  password: test
"#,
    )
    .unwrap()
}

fn test_catalog() -> Catalog {
    Catalog::from_yaml(
        r#"
tables:
  df_users:
    primary_keys: [user_id]
  df_plays:
    primary_keys: [play_id]
    foreign_keys:
      user_id: { table: df_users, column: user_id }
"#,
    )
    .unwrap()
}

async fn seed_bronze(store: &BlobStore) {
    // One exact duplicate row and a mostly-date started_at column.
    store
        .put(
            "bronze/df_users.csv",
            Bytes::from(
                "user_id,name,joined\n\
                 1,ana,2024-01-05\n\
                 2,bob,2024-02-10\n\
                 2,bob,2024-02-10\n\
                 3,,\n",
            ),
        )
        .await
        .unwrap();
    store
        .put(
            "bronze/df_plays.json",
            Bytes::from(
                r#"[
                    {"play_id": 1, "user_id": 1, "started_at": "2024-03-01 10:00:00"},
                    {"play_id": 2, "user_id": 2, "started_at": null}
                ]"#,
            ),
        )
        .await
        .unwrap();
    // Not a supported format: must be skipped, not fail the run.
    store
        .put("bronze/notes.txt", Bytes::from_static(b"free text"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pipeline_end_to_end() {
    let store = BlobStore::new(Arc::new(InMemory::new()));
    seed_bronze(&store).await;

    let warehouse = Arc::new(RecordingWarehouse::default());
    let pipeline = Pipeline::with_collaborators(
        test_config(),
        test_catalog(),
        store.clone(),
        warehouse.clone(),
    );

    let result = pipeline.run().await.unwrap();

    assert_eq!(result.status, "completed");
    assert_eq!(result.datasets_extracted, 2);
    assert_eq!(result.parquet_written, 2);
    assert_eq!(result.tables_loaded, 2);
    assert_eq!(result.tables_failed, 0);
    assert_eq!(result.constraints_total, 3);
    assert_eq!(result.constraints_failed, 0);

    // Warehouse received deduplicated, prefix-stripped tables.
    let tables = warehouse.tables.lock().unwrap();
    let (users, user_rows) = &tables["users"];
    assert_eq!(*user_rows, 3);
    // joined classified as a date column (2 of 3 rows parse), with the
    // null preserved.
    let joined = users.column("joined").unwrap();
    assert_eq!(joined.ty, ColumnType::Timestamp);
    assert!(joined.values[2].is_null());
    // Empty name filled with the empty string, not null.
    assert_eq!(users.column("name").unwrap().values[2], Value::Text(String::new()));

    let (_, play_rows) = &tables["plays"];
    assert_eq!(*play_rows, 2);
    drop(tables);

    let constraints = warehouse.constraints.lock().unwrap();
    assert!(constraints.contains(&"pk:users:user_id".to_string()));
    assert!(constraints.contains(&"pk:plays:play_id".to_string()));
    assert!(constraints.contains(&"fk:plays.user_id:users.user_id".to_string()));
}

#[tokio::test]
async fn test_pipeline_writes_cleaned_parquet_to_silver() {
    let store = BlobStore::new(Arc::new(InMemory::new()));
    seed_bronze(&store).await;

    let pipeline = Pipeline::with_collaborators(
        test_config(),
        test_catalog(),
        store.clone(),
        Arc::new(RecordingWarehouse::default()),
    );
    pipeline.run().await.unwrap();

    let mut keys = store.list("silver").await.unwrap();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "silver/df_plays.parquet".to_string(),
            "silver/df_users.parquet".to_string()
        ]
    );

    // The silver object holds the cleaned frame: duplicate dropped, date
    // column typed as timestamp.
    let back = from_parquet_bytes(store.get("silver/df_users.parquet").await.unwrap()).unwrap();
    assert_eq!(back.row_count(), 3);
    assert_eq!(back.column("joined").unwrap().ty, ColumnType::Timestamp);
}

#[tokio::test]
async fn test_pipeline_partial_when_constraint_fails() {
    let store = BlobStore::new(Arc::new(InMemory::new()));
    // df_plays references df_users, which is absent from the input.
    store
        .put(
            "bronze/df_plays.json",
            Bytes::from(r#"[{"play_id": 1, "user_id": 9}]"#),
        )
        .await
        .unwrap();

    let pipeline = Pipeline::with_collaborators(
        test_config(),
        test_catalog(),
        store,
        Arc::new(RecordingWarehouse::default()),
    );
    let result = pipeline.run().await.unwrap();

    assert_eq!(result.status, "partial");
    assert_eq!(result.tables_loaded, 1);
    assert_eq!(result.constraints_failed, 1);
}
