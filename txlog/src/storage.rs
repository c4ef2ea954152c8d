//! Log-specific storage wrappers.
//!
//! [`TxStorage`] and [`TxStorageRead`] wrap the store traits with the
//! handful of operations the log performs on them: reading and conditionally
//! advancing the counter record, writing record batches, and scanning one
//! partition page by page.

use std::sync::Arc;

use bytes::Bytes;
use common::{
    ConditionalWrite, ItemKey, Precondition, Record, ScanPage, ScanRequest, Storage, StorageRead,
};

use crate::error::Result;
use crate::serde::CounterValue;
use crate::txid::{COUNTER_PARTITION, COUNTER_RANGE_KEY};

const COUNTER_KEY: ItemKey = ItemKey::new(COUNTER_PARTITION, COUNTER_RANGE_KEY);

/// The counter record as read from the store.
///
/// `raw` is the stored value, kept so a compare-and-swap can be made against
/// exactly what was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CounterSnapshot {
    pub(crate) value: CounterValue,
    pub(crate) raw: Bytes,
}

/// Read-only log storage operations.
#[derive(Clone)]
pub(crate) struct TxStorageRead {
    storage: Arc<dyn StorageRead>,
}

impl TxStorageRead {
    pub(crate) fn new(storage: Arc<dyn StorageRead>) -> Self {
        Self { storage }
    }

    /// Reads the counter record with strong consistency.
    ///
    /// Returns `None` if no transaction was ever allocated.
    pub(crate) async fn get_counter(&self) -> Result<Option<CounterSnapshot>> {
        let Some(record) = self.storage.get(COUNTER_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(CounterSnapshot {
            value: CounterValue::deserialize(&record.value)?,
            raw: record.value,
        }))
    }

    /// Reads one page of `partition`, starting strictly after
    /// `exclusive_start_key` when set.
    pub(crate) async fn scan_partition(
        &self,
        partition: u64,
        exclusive_start_key: Option<u64>,
        page_size: usize,
    ) -> Result<ScanPage> {
        let request = ScanRequest::new(partition)
            .with_exclusive_start_key(exclusive_start_key)
            .with_limit(page_size);
        Ok(self.storage.scan(request).await?)
    }
}

/// Read-write log storage operations.
#[derive(Clone)]
pub(crate) struct TxStorage {
    storage: Arc<dyn Storage>,
}

impl TxStorage {
    pub(crate) fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Creates a new log storage with an in-memory backend.
    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        use common::storage::in_memory::InMemoryStorage;
        Self::new(Arc::new(InMemoryStorage::new()))
    }

    pub(crate) fn as_read(&self) -> TxStorageRead {
        TxStorageRead::new(Arc::clone(&self.storage) as Arc<dyn StorageRead>)
    }

    /// Creates the counter record holding `value` if it does not exist yet.
    pub(crate) async fn create_counter(&self, value: CounterValue) -> Result<ConditionalWrite> {
        let record = Record::new(COUNTER_KEY, value.serialize());
        Ok(self
            .storage
            .put_if(record, Precondition::DoesNotExist)
            .await?)
    }

    /// Replaces the counter record with `next` if it still holds `observed`.
    pub(crate) async fn swap_counter(
        &self,
        observed: &CounterSnapshot,
        next: CounterValue,
    ) -> Result<ConditionalWrite> {
        let record = Record::new(COUNTER_KEY, next.serialize());
        Ok(self
            .storage
            .put_if(record, Precondition::ValueEquals(observed.raw.clone()))
            .await?)
    }

    /// Writes one batch of records unconditionally.
    pub(crate) async fn write_batch(&self, records: Vec<Record>) -> Result<()> {
        Ok(self.storage.write_batch(records).await?)
    }
}
