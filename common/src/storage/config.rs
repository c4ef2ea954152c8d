//! Storage configuration types.
//!
//! This module provides configuration structures for the supported storage
//! backends, allowing services to pick the store (InMemory, SlateDB or
//! DynamoDB) via config files or environment variables.

use serde::{Deserialize, Serialize};

/// Top-level storage configuration.
///
/// Defaults to `SlateDb` with a local `.data` directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum StorageConfig {
    InMemory,
    SlateDb(SlateDbStorageConfig),
    DynamoDb(DynamoDbStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::SlateDb(SlateDbStorageConfig {
            path: "data".to_string(),
            object_store: ObjectStoreConfig::Local(LocalObjectStoreConfig {
                path: ".data".to_string(),
            }),
            settings_path: None,
        })
    }
}

/// SlateDB-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlateDbStorageConfig {
    /// Path prefix for SlateDB data in the object store.
    pub path: String,

    /// Object store provider configuration.
    pub object_store: ObjectStoreConfig,

    /// Optional path to SlateDB settings file (TOML/YAML/JSON).
    ///
    /// If not provided, uses SlateDB's `Settings::load()` which checks for
    /// `SlateDb.toml`, `SlateDb.json`, `SlateDb.yaml` in the working directory
    /// and merges any `SLATEDB_` prefixed environment variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<String>,
}

impl Default for SlateDbStorageConfig {
    fn default() -> Self {
        Self {
            path: "data".to_string(),
            object_store: ObjectStoreConfig::default(),
            settings_path: None,
        }
    }
}

/// Object store provider configuration for SlateDB.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ObjectStoreConfig {
    /// In-memory object store (useful for testing and development).
    #[default]
    InMemory,

    /// AWS S3 object store.
    Aws(AwsObjectStoreConfig),

    /// Local filesystem object store.
    Local(LocalObjectStoreConfig),
}

/// AWS S3 object store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AwsObjectStoreConfig {
    /// AWS region (e.g., "us-west-2").
    pub region: String,

    /// S3 bucket name.
    pub bucket: String,
}

/// Local filesystem object store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalObjectStoreConfig {
    /// Path to the local directory for storage.
    pub path: String,
}

/// DynamoDB table configuration.
///
/// The table must exist with a numeric partition key named `partition` and a
/// numeric sort key named `range_key`. Credentials are resolved from the
/// environment unless either `profile` or an explicit access key is given,
/// never both.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DynamoDbStorageConfig {
    /// Name of the table.
    pub table: String,

    /// AWS region (e.g., "us-west-2").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Endpoint override, for DynamoDB Local or compatible services.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Named profile from the shared AWS config files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_slatedb_with_local_data_dir() {
        // given/when
        let config = StorageConfig::default();

        // then
        match config {
            StorageConfig::SlateDb(slate_config) => {
                assert_eq!(slate_config.path, "data");
                assert_eq!(
                    slate_config.object_store,
                    ObjectStoreConfig::Local(LocalObjectStoreConfig {
                        path: ".data".to_string()
                    })
                );
            }
            _ => panic!("Expected SlateDb config as default"),
        }
    }

    #[test]
    fn should_deserialize_in_memory_config() {
        // given
        let yaml = r#"type: InMemory"#;

        // when
        let config: StorageConfig = serde_yaml::from_str(yaml).unwrap();

        // then
        assert_eq!(config, StorageConfig::InMemory);
    }

    #[test]
    fn should_deserialize_slatedb_config_with_aws_object_store() {
        // given
        let yaml = r#"
type: SlateDb
path: tx-data
object_store:
  type: Aws
  region: us-west-2
  bucket: tx-bucket
settings_path: slatedb.toml
"#;

        // when
        let config: StorageConfig = serde_yaml::from_str(yaml).unwrap();

        // then
        let StorageConfig::SlateDb(slate_config) = config else {
            panic!("Expected SlateDb config");
        };
        assert_eq!(slate_config.path, "tx-data");
        assert_eq!(
            slate_config.object_store,
            ObjectStoreConfig::Aws(AwsObjectStoreConfig {
                region: "us-west-2".to_string(),
                bucket: "tx-bucket".to_string()
            })
        );
        assert_eq!(slate_config.settings_path, Some("slatedb.toml".to_string()));
    }

    #[test]
    fn should_deserialize_dynamodb_config() {
        // given
        let yaml = r#"
type: DynamoDb
table: transactions
region: eu-west-1
endpoint_url: http://localhost:8000
"#;

        // when
        let config: StorageConfig = serde_yaml::from_str(yaml).unwrap();

        // then
        assert_eq!(
            config,
            StorageConfig::DynamoDb(DynamoDbStorageConfig {
                table: "transactions".to_string(),
                region: Some("eu-west-1".to_string()),
                endpoint_url: Some("http://localhost:8000".to_string()),
                ..Default::default()
            })
        );
    }

    #[test]
    fn should_omit_unset_dynamodb_credentials_when_serializing() {
        // given
        let config = StorageConfig::DynamoDb(DynamoDbStorageConfig {
            table: "transactions".to_string(),
            ..Default::default()
        });

        // when
        let yaml = serde_yaml::to_string(&config).unwrap();

        // then
        assert!(yaml.contains("type: DynamoDb"));
        assert!(yaml.contains("table: transactions"));
        assert!(!yaml.contains("access_key_id"));
        assert!(!yaml.contains("profile"));
    }
}
