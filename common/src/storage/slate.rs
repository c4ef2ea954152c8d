use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use slatedb::{Db, WriteBatch};
use tokio::sync::Mutex;

use super::{
    ConditionalWrite, ItemKey, Precondition, Record, ScanPage, ScanRequest, Storage, StorageError,
    StorageRead, StorageResult, check_batch_size,
};
use crate::serde::item_key;

/// SlateDB-backed implementation of the Storage trait.
///
/// SlateDB is an embedded key-value store built on object storage, providing
/// LSM-tree semantics with cloud-native durability. Item keys are stored as
/// 16-byte big-endian `(partition, range_key)` pairs so byte order matches
/// key order and a partition scan is a plain range scan.
///
/// SlateDB has a single writer per database, so conditional writes are made
/// atomic with an in-process lock around the read-compare-write sequence.
pub struct SlateDbStorage {
    db: Arc<Db>,
    write_lock: Mutex<()>,
}

impl SlateDbStorage {
    /// Creates a new SlateDbStorage instance wrapping the given SlateDB database.
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Flushes outstanding writes and closes the database.
    pub async fn close(&self) -> StorageResult<()> {
        self.db.close().await.map_err(StorageError::from_storage)
    }

    async fn read(&self, key: ItemKey) -> StorageResult<Option<Bytes>> {
        self.db
            .get(item_key::serialize(key))
            .await
            .map_err(StorageError::from_storage)
    }
}

#[async_trait]
impl StorageRead for SlateDbStorage {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: ItemKey) -> StorageResult<Option<Record>> {
        Ok(self.read(key).await?.map(|value| Record::new(key, value)))
    }

    #[tracing::instrument(level = "trace", skip_all, fields(partition = request.partition))]
    async fn scan(&self, request: ScanRequest) -> StorageResult<ScanPage> {
        let start = match request.exclusive_start_key {
            Some(range_key) => Bound::Excluded(item_key::serialize(ItemKey::new(
                request.partition,
                range_key,
            ))),
            None => Bound::Included(item_key::serialize(ItemKey::new(request.partition, 0))),
        };
        let end = Bound::Included(item_key::serialize(ItemKey::new(
            request.partition,
            u64::MAX,
        )));

        let mut iter = self
            .db
            .scan((start, end))
            .await
            .map_err(StorageError::from_storage)?;

        let mut records = Vec::with_capacity(request.limit.min(1024));
        let mut more = false;
        while let Some(entry) = iter.next().await.map_err(StorageError::from_storage)? {
            if records.len() == request.limit {
                more = true;
                break;
            }
            let key = item_key::deserialize(&entry.key)
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            records.push(Record::new(key, entry.value));
        }

        let last_evaluated_key = if more {
            records.last().map(|record| record.key.range_key)
        } else {
            None
        };
        Ok(ScanPage {
            records,
            last_evaluated_key,
        })
    }
}

#[async_trait]
impl Storage for SlateDbStorage {
    async fn put_if(
        &self,
        record: Record,
        precondition: Precondition,
    ) -> StorageResult<ConditionalWrite> {
        let _guard = self.write_lock.lock().await;

        let holds = match &precondition {
            Precondition::None => true,
            Precondition::DoesNotExist => self.read(record.key).await?.is_none(),
            Precondition::ValueEquals(expected) => {
                self.read(record.key).await?.as_ref() == Some(expected)
            }
        };
        if !holds {
            return Ok(ConditionalWrite::ConditionFailed);
        }

        self.db
            .put(item_key::serialize(record.key), record.value)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(ConditionalWrite::Applied)
    }

    async fn write_batch(&self, records: Vec<Record>) -> StorageResult<()> {
        check_batch_size(&records)?;
        let mut batch = WriteBatch::new();
        for record in records {
            batch.put(item_key::serialize(record.key), record.value);
        }
        let _guard = self.write_lock.lock().await;
        self.db
            .write(batch)
            .await
            .map_err(StorageError::from_storage)?;
        Ok(())
    }
}
