//! DynamoDB-backed store.
//!
//! Items live in one table keyed by a numeric partition key `partition` and a
//! numeric sort key `range_key`; the value is kept in the binary attribute
//! `data`. Conditional writes map onto DynamoDB condition expressions and
//! partition scans onto consistent `Query` calls.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::{
    config::Credentials,
    error::{DisplayErrorContext, SdkError},
    operation::put_item::PutItemError,
    primitives::Blob,
    types::{AttributeValue, PutRequest, ReturnConsumedCapacity, ReturnValue, WriteRequest},
};
use bytes::Bytes;

use super::config::DynamoDbStorageConfig;
use super::{
    ConditionalWrite, ItemKey, Precondition, Record, ScanPage, ScanRequest, Storage, StorageError,
    StorageRead, StorageResult, check_batch_size,
};
use crate::RetryPolicy;

const PARTITION_FIELD: &str = "partition";
const RANGE_KEY_FIELD: &str = "range_key";
const DATA_FIELD: &str = "data";

const CONDITION_DOES_NOT_EXIST: &str = "attribute_not_exists(#p)";
const CONDITION_VALUE_EQUALS: &str = "#d = :expected";

type Item = HashMap<String, AttributeValue>;

pub struct DynamoDbStorage {
    table: String,
    client: aws_sdk_dynamodb::Client,
    unprocessed_retry: RetryPolicy,
}

impl DynamoDbStorage {
    /// Builds a client from the given configuration.
    ///
    /// Credentials come from the environment unless a profile or an explicit
    /// access key is configured. Setting both is rejected.
    pub async fn new(config: &DynamoDbStorageConfig) -> StorageResult<Self> {
        let cfg = aws_config::defaults(BehaviorVersion::latest());

        let cfg = match (&config.profile, &config.access_key_id) {
            (None, None) => cfg,
            (Some(_), Some(_)) => {
                return Err(StorageError::Storage(
                    "either `profile` or `access_key_id` may be configured for DynamoDB, not both"
                        .to_string(),
                ));
            }
            (Some(profile), None) => cfg.profile_name(profile),
            (None, Some(access_key_id)) => {
                let secret_access_key = config.secret_access_key.clone().ok_or_else(|| {
                    StorageError::Storage(
                        "missing `secret_access_key` for DynamoDB access key".to_string(),
                    )
                })?;
                let cred = Credentials::new(
                    access_key_id,
                    secret_access_key,
                    config.session_token.clone(),
                    None,
                    "config-file",
                );
                cfg.credentials_provider(cred)
            }
        };

        let cfg = match &config.region {
            Some(region) => cfg.region(Region::new(region.clone())),
            None => cfg,
        };

        let cfg = match &config.endpoint_url {
            Some(url) => cfg.endpoint_url(url),
            None => cfg,
        };

        let sdk_cfg = cfg.load().await;
        Ok(Self::with_client(
            aws_sdk_dynamodb::Client::new(&sdk_cfg),
            config.table.clone(),
        ))
    }

    pub fn with_client(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            client,
            unprocessed_retry: RetryPolicy::exponential(
                Duration::from_millis(50),
                2.0,
                Some(10),
                Some(Duration::from_secs(2)),
            ),
        }
    }
}

fn number(value: u64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

fn key_item(key: ItemKey) -> Item {
    HashMap::from([
        (PARTITION_FIELD.to_string(), number(key.partition)),
        (RANGE_KEY_FIELD.to_string(), number(key.range_key)),
    ])
}

fn record_item(record: Record) -> Item {
    let mut item = key_item(record.key);
    item.insert(
        DATA_FIELD.to_string(),
        AttributeValue::B(Blob::new(record.value.to_vec())),
    );
    item
}

fn number_field(item: &Item, field: &'static str) -> StorageResult<u64> {
    match item.get(field) {
        Some(AttributeValue::N(n)) => n
            .parse()
            .map_err(|_| StorageError::Internal(format!("field {field} has an invalid format"))),
        Some(_) => Err(StorageError::Internal(format!(
            "field {field} has wrong type"
        ))),
        None => Err(StorageError::Internal(format!("missing field {field}"))),
    }
}

fn item_record(mut item: Item) -> StorageResult<Record> {
    let key = ItemKey::new(
        number_field(&item, PARTITION_FIELD)?,
        number_field(&item, RANGE_KEY_FIELD)?,
    );
    let Some(AttributeValue::B(data)) = item.remove(DATA_FIELD) else {
        return Err(StorageError::Internal(format!(
            "field {DATA_FIELD} is missing or has wrong type"
        )));
    };
    Ok(Record::new(key, Bytes::from(data.into_inner())))
}

fn sdk_err<E, R>(err: SdkError<E, R>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    StorageError::from_storage(DisplayErrorContext(&err))
}

#[async_trait]
impl StorageRead for DynamoDbStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: ItemKey) -> StorageResult<Option<Record>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .return_consumed_capacity(ReturnConsumedCapacity::None)
            .consistent_read(true)
            .set_key(Some(key_item(key)))
            .send()
            .await
            .map_err(sdk_err)?;

        output.item.map(item_record).transpose()
    }

    #[tracing::instrument(level = "trace", skip_all, fields(partition = request.partition))]
    async fn scan(&self, request: ScanRequest) -> StorageResult<ScanPage> {
        let query = self
            .client
            .query()
            .table_name(&self.table)
            .return_consumed_capacity(ReturnConsumedCapacity::None)
            .consistent_read(true)
            .limit(i32::try_from(request.limit).unwrap_or(i32::MAX))
            .expression_attribute_names("#p", PARTITION_FIELD)
            .expression_attribute_values(":p", number(request.partition));

        let query = match request.exclusive_start_key {
            Some(start) => query
                .key_condition_expression("#p = :p AND #r > :start")
                .expression_attribute_names("#r", RANGE_KEY_FIELD)
                .expression_attribute_values(":start", number(start)),
            None => query.key_condition_expression("#p = :p"),
        };

        let output = query.send().await.map_err(sdk_err)?;

        let records = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(item_record)
            .collect::<StorageResult<Vec<_>>>()?;
        let last_evaluated_key = output
            .last_evaluated_key
            .map(|key| number_field(&key, RANGE_KEY_FIELD))
            .transpose()?;

        Ok(ScanPage {
            records,
            last_evaluated_key,
        })
    }
}

#[async_trait]
impl Storage for DynamoDbStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn put_if(
        &self,
        record: Record,
        precondition: Precondition,
    ) -> StorageResult<ConditionalWrite> {
        let put = self
            .client
            .put_item()
            .table_name(&self.table)
            .return_consumed_capacity(ReturnConsumedCapacity::None)
            .return_values(ReturnValue::None)
            .set_item(Some(record_item(record)));

        let put = match precondition {
            Precondition::None => put,
            Precondition::DoesNotExist => put
                .condition_expression(CONDITION_DOES_NOT_EXIST)
                .expression_attribute_names("#p", PARTITION_FIELD),
            Precondition::ValueEquals(expected) => put
                .condition_expression(CONDITION_VALUE_EQUALS)
                .expression_attribute_names("#d", DATA_FIELD)
                .expression_attribute_values(
                    ":expected",
                    AttributeValue::B(Blob::new(expected.to_vec())),
                ),
        };

        match put.send().await {
            Ok(_) => Ok(ConditionalWrite::Applied),
            Err(SdkError::ServiceError(err)) => match err.into_err() {
                PutItemError::ConditionalCheckFailedException(_) => {
                    Ok(ConditionalWrite::ConditionFailed)
                }
                err => Err(StorageError::from_storage(DisplayErrorContext(&err))),
            },
            Err(err) => Err(sdk_err(err)),
        }
    }

    #[tracing::instrument(level = "trace", skip_all, fields(records = records.len()))]
    async fn write_batch(&self, records: Vec<Record>) -> StorageResult<()> {
        check_batch_size(&records)?;
        if records.is_empty() {
            return Ok(());
        }

        let mut pending = records
            .into_iter()
            .map(|record| {
                let put = PutRequest::builder()
                    .set_item(Some(record_item(record)))
                    .build()
                    .map_err(|e| StorageError::Internal(e.to_string()))?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let mut delays = self.unprocessed_retry.iter();
        loop {
            let output = self
                .client
                .batch_write_item()
                .return_consumed_capacity(ReturnConsumedCapacity::None)
                .request_items(&self.table, pending)
                .send()
                .await
                .map_err(sdk_err)?;

            pending = output
                .unprocessed_items
                .and_then(|mut unprocessed| unprocessed.remove(&self.table))
                .unwrap_or_default();
            if pending.is_empty() {
                return Ok(());
            }

            match delays.next() {
                Some(delay) => {
                    tracing::debug!(
                        unprocessed = pending.len(),
                        ?delay,
                        "resubmitting unprocessed batch items"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(StorageError::Storage(format!(
                        "{} batch items remained unprocessed after {} attempts",
                        pending.len(),
                        delays.attempts()
                    )));
                }
            }
        }
    }
}
