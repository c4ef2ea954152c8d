use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use super::{
    ConditionalWrite, ItemKey, Precondition, Record, ScanPage, ScanRequest, Storage, StorageError,
    StorageRead, StorageResult, check_batch_size,
};

/// In-memory store backed by an ordered map.
///
/// Every operation takes the single lock, so conditional writes are
/// linearizable and reads always observe the latest acknowledged write.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    items: RwLock<BTreeMap<ItemKey, Bytes>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items across all partitions.
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_error<T>(_: T) -> StorageError {
        StorageError::Internal("in-memory storage lock poisoned".to_string())
    }
}

#[async_trait]
impl StorageRead for InMemoryStorage {
    async fn get(&self, key: ItemKey) -> StorageResult<Option<Record>> {
        let items = self.items.read().map_err(Self::lock_error)?;
        Ok(items.get(&key).map(|value| Record::new(key, value.clone())))
    }

    async fn scan(&self, request: ScanRequest) -> StorageResult<ScanPage> {
        let items = self.items.read().map_err(Self::lock_error)?;

        let start = match request.exclusive_start_key {
            Some(range_key) => Bound::Excluded(ItemKey::new(request.partition, range_key)),
            None => Bound::Included(ItemKey::new(request.partition, 0)),
        };
        let end = Bound::Included(ItemKey::new(request.partition, u64::MAX));

        let mut range = items.range((start, end));
        let records: Vec<Record> = range
            .by_ref()
            .take(request.limit)
            .map(|(key, value)| Record::new(*key, value.clone()))
            .collect();

        // A full page hands out a continuation token only if something follows.
        let last_evaluated_key = if records.len() == request.limit && range.next().is_some() {
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
impl Storage for InMemoryStorage {
    async fn put_if(
        &self,
        record: Record,
        precondition: Precondition,
    ) -> StorageResult<ConditionalWrite> {
        let mut items = self.items.write().map_err(Self::lock_error)?;
        let holds = match &precondition {
            Precondition::None => true,
            Precondition::DoesNotExist => !items.contains_key(&record.key),
            Precondition::ValueEquals(expected) => items.get(&record.key) == Some(expected),
        };
        if !holds {
            return Ok(ConditionalWrite::ConditionFailed);
        }
        items.insert(record.key, record.value);
        Ok(ConditionalWrite::Applied)
    }

    async fn write_batch(&self, records: Vec<Record>) -> StorageResult<()> {
        check_batch_size(&records)?;
        let mut items = self.items.write().map_err(Self::lock_error)?;
        for record in records {
            items.insert(record.key, record.value);
        }
        Ok(())
    }
}
