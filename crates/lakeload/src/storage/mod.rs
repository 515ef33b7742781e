//! Object storage stages: bronze extraction and the silver parquet sink.

pub mod arrow;
pub mod decode;

use crate::config::StorageConfig;
use crate::error::Result;
use crate::frame::FrameSet;
use bytes::Bytes;
use decode::FileFormat;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Handle to the object store holding the bronze and silver tiers.
#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
}

impl BlobStore {
    /// Connect to S3 using explicit credentials from the config when
    /// present, otherwise whatever the ambient AWS environment provides.
    pub fn s3(config: &StorageConfig) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);
        if let Some(key) = &config.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        let store = builder.build()?;

        info!("Connected to s3://{} ({})", config.bucket, config.region);
        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// Wrap an arbitrary object store implementation (in-memory in tests).
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// List all object keys under a prefix.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = ObjectPath::from(prefix);
        let prefix = (!prefix.is_empty()).then_some(&path);
        let mut keys = Vec::new();
        let mut stream = self.store.list(prefix);
        while let Some(meta) = stream.try_next().await? {
            keys.push(meta.location.to_string());
        }
        Ok(keys)
    }

    /// Read an object's full content.
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let bytes = self.store.get(&ObjectPath::from(key)).await?.bytes().await?;
        Ok(bytes)
    }

    /// Write an object.
    pub async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        self.store
            .put(&ObjectPath::from(key), PutPayload::from(bytes))
            .await?;
        Ok(())
    }
}

/// Extract stage: decode every supported object under the bronze prefix
/// into a frame keyed by file stem.
///
/// Per-object problems (unsupported extension, unreadable or corrupt file)
/// drop that dataset and continue; only listing the store at all is fatal.
pub async fn extract(store: &BlobStore, bronze_prefix: &str) -> Result<FrameSet> {
    let keys = store.list(bronze_prefix).await?;
    info!(
        "Found {} objects under bronze prefix '{}'",
        keys.len(),
        bronze_prefix
    );

    let mut frames = FrameSet::new();
    for key in keys {
        let filename = key.rsplit('/').next().unwrap_or(&key);
        let Some((stem, extension)) = filename.rsplit_once('.') else {
            warn!("Skipping '{}': no file extension", key);
            continue;
        };

        let format = match FileFormat::from_extension(extension) {
            Ok(format) => format,
            Err(e) => {
                warn!("Skipping '{}': {}", key, e);
                continue;
            }
        };

        let bytes = match store.get(&key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to read '{}': {}", key, e);
                continue;
            }
        };

        match decode::decode(format, &bytes) {
            Ok(frame) => {
                info!(
                    "Decoded '{}': {} rows, {} columns",
                    key,
                    frame.row_count(),
                    frame.column_count()
                );
                if frames.insert(stem.to_string(), frame).is_some() {
                    warn!("Duplicate dataset name '{}', keeping the later object", stem);
                }
            }
            Err(e) => {
                error!("Failed to decode '{}': {}", key, e);
            }
        }
    }

    Ok(frames)
}

/// Silver sink: serialize each frame to parquet under
/// `<silver_prefix>/<dataset>.parquet`. Returns how many objects were
/// written; per-dataset failures are logged and skipped.
pub async fn write_silver(
    store: &BlobStore,
    silver_prefix: &str,
    frames: &FrameSet,
) -> Result<usize> {
    let mut written = 0;
    for (name, frame) in frames {
        if frame.row_count() == 0 {
            warn!("Dataset '{}' is empty, skipping silver write", name);
            continue;
        }

        let bytes = match arrow::to_parquet_bytes(frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to encode '{}' as parquet: {}", name, e);
                continue;
            }
        };

        let key = join_key(silver_prefix, &format!("{}.parquet", name));
        match store.put(&key, bytes).await {
            Ok(()) => {
                info!("Wrote '{}'", key);
                written += 1;
            }
            Err(e) => {
                error!("Failed to write '{}': {}", key, e);
            }
        }
    }

    info!("Silver sink: {} of {} datasets written", written, frames.len());
    Ok(written)
}

fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Column, ColumnType, Frame, Value};
    use object_store::memory::InMemory;

    fn memory_store() -> BlobStore {
        BlobStore::new(Arc::new(InMemory::new()))
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("silver/", "users.parquet"), "silver/users.parquet");
        assert_eq!(join_key("silver", "users.parquet"), "silver/users.parquet");
        assert_eq!(join_key("", "users.parquet"), "users.parquet");
    }

    #[tokio::test]
    async fn test_extract_decodes_supported_and_skips_the_rest() {
        let store = memory_store();
        store
            .put("bronze/df_users.csv", Bytes::from("user_id,name\n1,ana\n2,bob\n"))
            .await
            .unwrap();
        store
            .put(
                "bronze/df_ratings.json",
                Bytes::from(r#"[{"rating_id": 1, "score": 4.5}]"#),
            )
            .await
            .unwrap();
        // Corrupt workbook: decode fails, dataset dropped.
        store
            .put("bronze/report.xlsx", Bytes::from_static(b"not a workbook"))
            .await
            .unwrap();
        // No decoder for pickle: skipped.
        store
            .put("bronze/legacy.pkl", Bytes::from_static(b"\x80\x04"))
            .await
            .unwrap();
        store
            .put("bronze/broken.json", Bytes::from("{ not json"))
            .await
            .unwrap();
        store
            .put("other/df_ignored.csv", Bytes::from("a\n1\n"))
            .await
            .unwrap();

        let frames = extract(&store, "bronze/").await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames["df_users"].row_count(), 2);
        assert_eq!(frames["df_ratings"].column_count(), 2);
    }

    #[tokio::test]
    async fn test_write_silver_skips_empty_frames() {
        let store = memory_store();
        let mut frames = FrameSet::new();
        frames.insert(
            "df_users".into(),
            Frame::try_new(vec![Column::new(
                "user_id",
                ColumnType::Int,
                vec![Value::Int(1)],
            )])
            .unwrap(),
        );
        frames.insert(
            "df_empty".into(),
            Frame::try_new(vec![Column::new("x", ColumnType::Text, vec![])]).unwrap(),
        );

        let written = write_silver(&store, "silver", &frames).await.unwrap();
        assert_eq!(written, 1);

        let keys = store.list("silver").await.unwrap();
        assert_eq!(keys, vec!["silver/df_users.parquet".to_string()]);
    }

    #[tokio::test]
    async fn test_silver_round_trip_preserves_shape() {
        let store = memory_store();
        let frame = Frame::try_new(vec![
            Column::new(
                "id",
                ColumnType::Int,
                vec![Value::Int(1), Value::Int(2)],
            ),
            Column::new(
                "name",
                ColumnType::Text,
                vec![Value::Text("ana".into()), Value::Text("bob".into())],
            ),
        ])
        .unwrap();
        let mut frames = FrameSet::new();
        frames.insert("df_users".into(), frame.clone());

        write_silver(&store, "silver", &frames).await.unwrap();
        let bytes = store.get("silver/df_users.parquet").await.unwrap();
        let back = arrow::from_parquet_bytes(bytes).unwrap();

        assert_eq!(back.row_count(), frame.row_count());
        assert_eq!(back.column_names(), frame.column_names());
    }
}
