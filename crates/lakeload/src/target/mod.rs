//! PostgreSQL warehouse operations.

use crate::config::WarehouseConfig;
use crate::error::{EtlError, Result};
use crate::frame::{ColumnType, Frame, Value};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio_postgres::{Config as PgConfig, NoTls, Transaction};
use tracing::{debug, info};

/// Trait for warehouse operations the loader drives.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Check if a table exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Drop a table if it exists.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Create a table from a frame's columns and bulk insert its rows,
    /// atomically: on failure the table does not exist.
    async fn create_with_rows(&self, table: &str, frame: &Frame) -> Result<u64>;

    /// Bulk insert a frame's rows into an existing table, atomically: on
    /// failure the table is unmodified.
    async fn append_rows(&self, table: &str, frame: &Frame) -> Result<u64>;

    /// Attach a (possibly composite) primary key, in its own transaction.
    async fn add_primary_key(&self, table: &str, columns: &[String]) -> Result<()>;

    /// Attach one foreign key constraint named `fk_<table>_<column>`, in
    /// its own transaction.
    async fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        ref_table: &str,
        ref_column: &str,
    ) -> Result<()>;

    /// Close all connections.
    async fn close(&self);
}

/// PostgreSQL warehouse implementation.
pub struct PgWarehouse {
    pool: Pool,
}

impl PgWarehouse {
    /// Create a new pool and verify connectivity.
    pub async fn connect(config: &WarehouseConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| EtlError::Pool(format!("Failed to create pool: {}", e)))?;

        let client = pool
            .get()
            .await
            .map_err(|e| EtlError::Pool(format!("Failed to get connection: {}", e)))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { pool })
    }

    /// Quote a PostgreSQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Generate DDL for table creation from frame column types.
    fn generate_ddl(table: &str, frame: &Frame) -> String {
        let cols: Vec<String> = frame
            .columns()
            .iter()
            .map(|c| format!("{} {}", Self::quote_ident(&c.name), pg_type(c.ty)))
            .collect();
        format!("CREATE TABLE {} ({})", Self::quote_ident(table), cols.join(", "))
    }

    /// Stream a frame's rows through COPY in text format.
    async fn copy_frame(tx: &Transaction<'_>, table: &str, frame: &Frame) -> Result<u64> {
        if frame.row_count() == 0 {
            return Ok(0);
        }

        let col_list: String = frame
            .columns()
            .iter()
            .map(|c| Self::quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let copy_stmt = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
            Self::quote_ident(table),
            col_list
        );

        let sink = tx.copy_in(&copy_stmt).await?;
        futures::pin_mut!(sink);

        const FLUSH_ROWS: usize = 10_000;
        let mut buf = BytesMut::with_capacity(1024 * 1024);
        let rows = frame.row_count();

        for i in 0..rows {
            for (j, col) in frame.columns().iter().enumerate() {
                if j > 0 {
                    buf.put_u8(b'\t');
                }
                let text = value_to_copy_text(&col.values[i]);
                buf.extend_from_slice(text.as_bytes());
            }
            buf.put_u8(b'\n');

            if (i + 1) % FLUSH_ROWS == 0 || i + 1 == rows {
                sink.send(buf.split().freeze())
                    .await
                    .map_err(|e| EtlError::load(table, format!("COPY send failed: {}", e)))?;
            }
        }

        let copied = sink.finish().await?;
        Ok(copied)
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| EtlError::Pool(e.to_string()))?;

        let row = client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = current_schema() AND table_name = $1
                )",
                &[&table],
            )
            .await?;

        Ok(row.get(0))
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| EtlError::Pool(e.to_string()))?;

        let sql = format!("DROP TABLE IF EXISTS {} CASCADE", Self::quote_ident(table));
        client.execute(&sql, &[]).await?;

        debug!("Dropped table {}", table);
        Ok(())
    }

    async fn create_with_rows(&self, table: &str, frame: &Frame) -> Result<u64> {
        if frame.column_count() == 0 {
            return Err(EtlError::load(table, "frame has no columns"));
        }

        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| EtlError::Pool(e.to_string()))?;

        let tx = client.transaction().await?;
        let ddl = Self::generate_ddl(table, frame);
        tx.execute(&ddl, &[]).await?;
        let copied = Self::copy_frame(&tx, table, frame).await?;
        tx.commit().await?;

        debug!("Created table {} with {} rows", table, copied);
        Ok(copied)
    }

    async fn append_rows(&self, table: &str, frame: &Frame) -> Result<u64> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| EtlError::Pool(e.to_string()))?;

        let tx = client.transaction().await?;
        let copied = Self::copy_frame(&tx, table, frame).await?;
        tx.commit().await?;

        debug!("Appended {} rows to table {}", copied, table);
        Ok(copied)
    }

    async fn add_primary_key(&self, table: &str, columns: &[String]) -> Result<()> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| EtlError::Pool(e.to_string()))?;

        let pk_cols: Vec<String> = columns.iter().map(|c| Self::quote_ident(c)).collect();
        let sql = format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            Self::quote_ident(table),
            pk_cols.join(", ")
        );

        let tx = client.transaction().await?;
        tx.execute(&sql, &[]).await?;
        tx.commit().await?;

        debug!("Created primary key for {}", table);
        Ok(())
    }

    async fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        ref_table: &str,
        ref_column: &str,
    ) -> Result<()> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| EtlError::Pool(e.to_string()))?;

        let fk_name = fk_constraint_name(table, column);

        let sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            Self::quote_ident(table),
            Self::quote_ident(&fk_name),
            Self::quote_ident(column),
            Self::quote_ident(ref_table),
            Self::quote_ident(ref_column)
        );

        let tx = client.transaction().await?;
        tx.execute(&sql, &[]).await?;
        tx.commit().await?;

        debug!("Created foreign key {} for {}", fk_name, table);
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Constraint name `fk_<table>_<column>`, cut to PostgreSQL's 63-byte
/// identifier limit. Table names come from arbitrary file stems, so the
/// cut must land on a char boundary rather than a raw byte offset.
fn fk_constraint_name(table: &str, column: &str) -> String {
    let mut name = format!("fk_{}_{}", table, column);
    if name.len() > 63 {
        let mut end = 63;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// Map a frame column type to its PostgreSQL type.
fn pg_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Int => "bigint",
        ColumnType::Float => "double precision",
        ColumnType::Bool => "boolean",
        ColumnType::Text => "text",
        ColumnType::Timestamp => "timestamp",
    }
}

/// Convert a value to text format for COPY.
/// Escapes special characters: backslash, tab, newline, carriage return.
fn value_to_copy_text(value: &Value) -> String {
    match value {
        Value::Null => "\\N".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        Value::Text(s) => escape_copy_text(s),
        Value::Timestamp(t) => t.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
    }
}

fn escape_copy_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}
