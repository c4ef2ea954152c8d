//! Configuration for the txlog HTTP server.

use clap::Parser;
use common::StorageConfig;
use common::storage::config::{
    AwsObjectStoreConfig, DynamoDbStorageConfig, LocalObjectStoreConfig, ObjectStoreConfig,
    SlateDbStorageConfig,
};

use crate::{AllocatorConfig, Config};

/// CLI arguments for the txlog server.
#[derive(Debug, Parser)]
#[command(name = "txlog")]
#[command(about = "txlog HTTP Server")]
pub struct CliArgs {
    /// HTTP server port.
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// Storage data directory path (for local storage).
    #[arg(long, default_value = ".data")]
    pub data_dir: String,

    /// Use in-memory storage (for testing).
    #[arg(long, default_value = "false")]
    pub in_memory: bool,

    /// S3 bucket name (enables SlateDB on S3 when set).
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// AWS region for S3 storage.
    #[arg(long, default_value = "us-east-1")]
    pub s3_region: String,

    /// DynamoDB table name (enables DynamoDB storage when set).
    #[arg(long)]
    pub dynamodb_table: Option<String>,

    /// AWS region for DynamoDB.
    #[arg(long)]
    pub dynamodb_region: Option<String>,

    /// Endpoint override for DynamoDB Local or compatible services.
    #[arg(long)]
    pub dynamodb_endpoint: Option<String>,

    /// Give up allocating after this many lost races on the counter record.
    /// Retries forever when unset.
    #[arg(long)]
    pub allocator_max_attempts: Option<usize>,
}

impl CliArgs {
    /// Convert CLI args to log configuration.
    pub fn to_txlog_config(&self) -> Config {
        let storage = if self.in_memory {
            StorageConfig::InMemory
        } else if let Some(table) = &self.dynamodb_table {
            StorageConfig::DynamoDb(DynamoDbStorageConfig {
                table: table.clone(),
                region: self.dynamodb_region.clone(),
                endpoint_url: self.dynamodb_endpoint.clone(),
                ..Default::default()
            })
        } else if let Some(bucket) = &self.s3_bucket {
            StorageConfig::SlateDb(SlateDbStorageConfig {
                path: "data".to_string(),
                object_store: ObjectStoreConfig::Aws(AwsObjectStoreConfig {
                    region: self.s3_region.clone(),
                    bucket: bucket.clone(),
                }),
                settings_path: None,
            })
        } else {
            StorageConfig::SlateDb(SlateDbStorageConfig {
                path: "data".to_string(),
                object_store: ObjectStoreConfig::Local(LocalObjectStoreConfig {
                    path: self.data_dir.clone(),
                }),
                settings_path: None,
            })
        };

        let defaults = AllocatorConfig::default();
        let allocator = AllocatorConfig {
            retry_policy: defaults
                .retry_policy
                .with_max_attempts(self.allocator_max_attempts),
        };

        Config {
            storage,
            allocator,
            ..Default::default()
        }
    }
}

/// Configuration for the txlog HTTP server.
#[derive(Debug, Clone)]
pub struct TxLogServerConfig {
    /// HTTP server port.
    pub port: u16,
}

impl Default for TxLogServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl From<&CliArgs> for TxLogServerConfig {
    fn from(args: &CliArgs) -> Self {
        Self { port: args.port }
    }
}
