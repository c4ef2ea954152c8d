//! Batched transaction writes.
//!
//! A transaction is written as one metadata record followed by one record per
//! event, all in the transaction's own range-key block. Records go out in
//! batches of [`MAX_BATCH_WRITE_RECORDS`], one batch at a time, so whatever a
//! failed write leaves behind is always a prefix of the transaction.

use std::sync::Arc;

use bytes::Bytes;
use common::clock::Clock;
use common::{ItemKey, MAX_BATCH_WRITE_RECORDS, Record};

use crate::codec::PayloadCodec;
use crate::error::{Error, Result};
use crate::model::SubmittedTx;
use crate::serde::TxMetaValue;
use crate::storage::TxStorage;
use crate::txid::{MAX_EVENTS_PER_TX, TxId, item_key};

/// Rejects transactions with more events than a range-key block can hold.
pub(crate) fn validate_event_count(count: usize) -> Result<()> {
    if count > MAX_EVENTS_PER_TX {
        return Err(Error::InvalidInput(format!(
            "transaction has {} events, at most {} are allowed",
            count, MAX_EVENTS_PER_TX
        )));
    }
    Ok(())
}

pub(crate) struct TxWriter {
    storage: TxStorage,
    codec: Arc<dyn PayloadCodec>,
    clock: Arc<dyn Clock>,
}

impl TxWriter {
    pub(crate) fn new(
        storage: TxStorage,
        codec: Arc<dyn PayloadCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            codec,
            clock,
        }
    }

    /// Writes the records of transaction `tx_id`.
    ///
    /// Any failed batch returns [`Error::PartialWrite`]. A store may apply
    /// part of a batch before failing it, so `batches_written` is a lower
    /// bound on what is visible. Whatever was written stays in place.
    #[tracing::instrument(level = "trace", skip_all, fields(tx_id = %tx_id, events = events.len()))]
    pub(crate) async fn write_transaction(
        &self,
        tx_id: TxId,
        events: &[Bytes],
    ) -> Result<SubmittedTx> {
        validate_event_count(events.len())?;

        let tx_time_ms = self.clock.now_ms();
        let records = self.build_records(tx_id, tx_time_ms, events)?;

        let total_batches = records.len().div_ceil(MAX_BATCH_WRITE_RECORDS);
        let mut records = records.into_iter();
        for batch_index in 0..total_batches {
            let batch: Vec<Record> = records.by_ref().take(MAX_BATCH_WRITE_RECORDS).collect();
            if let Err(err) = self.storage.write_batch(batch).await {
                tracing::warn!(
                    %tx_id,
                    batches_written = batch_index,
                    total_batches,
                    error = %err,
                    "transaction left partially written"
                );
                return Err(Error::PartialWrite {
                    tx_id,
                    batches_written: batch_index,
                    total_batches,
                    cause: err.to_string(),
                });
            }
        }

        Ok(SubmittedTx { tx_id, tx_time_ms })
    }

    fn build_records(&self, tx_id: TxId, tx_time_ms: i64, events: &[Bytes]) -> Result<Vec<Record>> {
        let partition = tx_id.partition();
        let index = tx_id.index();
        let event_count = u32::try_from(events.len())
            .map_err(|_| Error::Internal("event count exceeds u32".to_string()))?;

        let mut records = Vec::with_capacity(events.len() + 1);
        records.push(Record::new(
            ItemKey::new(partition, item_key(index, 0)),
            TxMetaValue::new(tx_time_ms, event_count).serialize(self.codec.as_ref()),
        ));
        for (offset, event) in (1u64..).zip(events) {
            records.push(Record::new(
                ItemKey::new(partition, item_key(index, offset)),
                self.codec.encode(event),
            ));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use common::clock::MockClock;
    use common::storage::in_memory::InMemoryStorage;
    use common::{
        ConditionalWrite, Precondition, ScanPage, ScanRequest, Storage, StorageError, StorageRead,
        StorageResult,
    };

    use super::*;
    use crate::codec::RawCodec;

    /// Store that fails every batch write after the first `allowed` ones.
    struct FailingBatches {
        inner: InMemoryStorage,
        allowed: usize,
        batches: AtomicUsize,
    }

    impl FailingBatches {
        fn new(allowed: usize) -> Self {
            Self {
                inner: InMemoryStorage::new(),
                allowed,
                batches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StorageRead for FailingBatches {
        async fn get(&self, key: ItemKey) -> StorageResult<Option<Record>> {
            self.inner.get(key).await
        }

        async fn scan(&self, request: ScanRequest) -> StorageResult<ScanPage> {
            self.inner.scan(request).await
        }
    }

    #[async_trait]
    impl Storage for FailingBatches {
        async fn put_if(
            &self,
            record: Record,
            precondition: Precondition,
        ) -> StorageResult<ConditionalWrite> {
            self.inner.put_if(record, precondition).await
        }

        async fn write_batch(&self, records: Vec<Record>) -> StorageResult<()> {
            if self.batches.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(StorageError::Storage("throughput exceeded".to_string()));
            }
            self.inner.write_batch(records).await
        }
    }

    fn writer(store: Arc<dyn Storage>) -> TxWriter {
        TxWriter::new(
            TxStorage::new(store),
            Arc::new(RawCodec),
            Arc::new(MockClock::with_millis(1_000)),
        )
    }

    fn events(n: usize) -> Vec<Bytes> {
        (0..n).map(|i| Bytes::from(format!("event-{i}"))).collect()
    }

    #[tokio::test]
    async fn should_write_metadata_and_events_in_transaction_block() {
        // given
        let store = Arc::new(InMemoryStorage::new());
        let writer = writer(store.clone());
        let tx_id = TxId::new(3, 2);

        // when
        let submitted = writer
            .write_transaction(tx_id, &events(2))
            .await
            .unwrap();

        // then
        assert_eq!(submitted, SubmittedTx { tx_id, tx_time_ms: 1_000 });
        let page = store.scan(ScanRequest::new(3)).await.unwrap();
        let keys: Vec<u64> = page.records.iter().map(|r| r.key.range_key).collect();
        assert_eq!(keys, vec![2 << 17, (2 << 17) | 1, (2 << 17) | 2]);
        let meta = TxMetaValue::deserialize(&page.records[0].value, &RawCodec).unwrap();
        assert_eq!(meta, TxMetaValue::new(1_000, 2));
        assert_eq!(page.records[2].value, Bytes::from("event-1"));
    }

    #[tokio::test]
    async fn should_split_records_into_batches_of_25() {
        // given
        let store = Arc::new(FailingBatches::new(usize::MAX));
        let writer = writer(store.clone());

        // when
        writer
            .write_transaction(TxId::new(0, 1), &events(60))
            .await
            .unwrap();

        // then
        assert_eq!(store.batches.load(Ordering::SeqCst), 3);
        assert_eq!(store.inner.len(), 61);
    }

    #[tokio::test]
    async fn should_report_partial_write_after_first_batch() {
        // given
        let store = Arc::new(FailingBatches::new(1));
        let writer = writer(store.clone());
        let tx_id = TxId::new(0, 1);

        // when
        let result = writer.write_transaction(tx_id, &events(60)).await;

        // then
        match result {
            Err(Error::PartialWrite {
                tx_id: failed,
                batches_written,
                total_batches,
                cause,
            }) => {
                assert_eq!(failed, tx_id);
                assert_eq!(batches_written, 1);
                assert_eq!(total_batches, 3);
                assert!(cause.contains("throughput exceeded"));
            }
            other => panic!("expected partial write, got {:?}", other),
        }
        assert_eq!(store.inner.len(), 25);
    }

    #[tokio::test]
    async fn should_report_first_batch_failure_as_partial_write() {
        // given
        let store = Arc::new(FailingBatches::new(0));
        let writer = writer(store.clone());

        // when
        let result = writer.write_transaction(TxId::new(0, 1), &events(3)).await;

        // then
        assert!(matches!(
            result,
            Err(Error::PartialWrite {
                batches_written: 0,
                total_batches: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn should_reject_too_many_events_before_writing() {
        // given
        let store = Arc::new(FailingBatches::new(usize::MAX));
        let writer = writer(store.clone());
        let events = vec![Bytes::new(); MAX_EVENTS_PER_TX + 1];

        // when
        let result = writer.write_transaction(TxId::new(0, 1), &events).await;

        // then
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(store.batches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn should_accept_largest_transaction() {
        assert!(validate_event_count(MAX_EVENTS_PER_TX).is_ok());
        assert!(validate_event_count(0).is_ok());
    }
}
