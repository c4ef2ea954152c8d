//! Storage factory for creating storage instances from configuration.

use std::sync::Arc;

use slatedb::DbBuilder;
use slatedb::config::Settings;
use slatedb::object_store;

use super::config::{ObjectStoreConfig, SlateDbStorageConfig, StorageConfig};
use super::dynamodb::DynamoDbStorage;
use super::in_memory::InMemoryStorage;
use super::slate::SlateDbStorage;
use super::{Storage, StorageError, StorageResult};

/// Creates a storage instance based on the provided configuration.
///
/// # Examples
///
/// ```rust,ignore
/// use common::storage::config::{DynamoDbStorageConfig, StorageConfig};
/// use common::storage::factory::create_storage;
///
/// let storage = create_storage(&StorageConfig::InMemory).await?;
///
/// let config = StorageConfig::DynamoDb(DynamoDbStorageConfig {
///     table: "transactions".to_string(),
///     region: Some("us-west-2".to_string()),
///     ..Default::default()
/// });
/// let storage = create_storage(&config).await?;
/// ```
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config {
        StorageConfig::InMemory => Ok(Arc::new(InMemoryStorage::new())),
        StorageConfig::SlateDb(slate_config) => {
            let storage = create_slatedb_storage(slate_config).await?;
            Ok(Arc::new(storage))
        }
        StorageConfig::DynamoDb(dynamo_config) => {
            let storage = DynamoDbStorage::new(dynamo_config).await?;
            Ok(Arc::new(storage))
        }
    }
}

async fn create_slatedb_storage(config: &SlateDbStorageConfig) -> StorageResult<SlateDbStorage> {
    let object_store: Arc<dyn object_store::ObjectStore> = match &config.object_store {
        ObjectStoreConfig::InMemory => Arc::new(object_store::memory::InMemory::new()),
        ObjectStoreConfig::Aws(aws_config) => {
            let store = object_store::aws::AmazonS3Builder::new()
                .with_region(&aws_config.region)
                .with_bucket_name(&aws_config.bucket)
                .build()
                .map_err(|e| {
                    StorageError::Storage(format!("Failed to create AWS S3 store: {}", e))
                })?;
            Arc::new(store)
        }
        ObjectStoreConfig::Local(local_config) => {
            std::fs::create_dir_all(&local_config.path).map_err(|e| {
                StorageError::Storage(format!(
                    "Failed to create storage directory '{}': {}",
                    local_config.path, e
                ))
            })?;
            let store = object_store::local::LocalFileSystem::new_with_prefix(&local_config.path)
                .map_err(|e| {
                    StorageError::Storage(format!("Failed to create local filesystem store: {}", e))
                })?;
            Arc::new(store)
        }
    };

    let settings = match &config.settings_path {
        Some(path) => Settings::from_file(path).map_err(|e| {
            StorageError::Storage(format!(
                "Failed to load SlateDB settings from {}: {}",
                path, e
            ))
        })?,
        None => Settings::load().unwrap_or_default(),
    };

    let db = DbBuilder::new(config.path.clone(), object_store)
        .with_settings(settings)
        .build()
        .await
        .map_err(|e| StorageError::Storage(format!("Failed to create SlateDB: {}", e)))?;

    Ok(SlateDbStorage::new(Arc::new(db)))
}
