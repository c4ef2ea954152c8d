//! Core log implementation with read and write APIs.
//!
//! This module provides [`TxLog`], the primary entry point for interacting
//! with the transaction log. It exposes the write operation ([`submit`]) and
//! the read operations of the [`TxRead`] trait.
//!
//! [`submit`]: TxLog::submit

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::clock::{Clock, SystemClock};
use common::Storage;

use crate::codec::{PayloadCodec, RawCodec};
use crate::config::{Config, ReadOptions, ScanConfig};
use crate::error::Result;
use crate::model::SubmittedTx;
use crate::reader::{self, TxIterator, TxLogReader, TxRead};
use crate::sequence::TxIdAllocator;
use crate::storage::TxStorage;
use crate::txid::TxId;
use crate::writer::{TxWriter, validate_event_count};

/// The transaction log.
///
/// # Thread Safety
///
/// `TxLog` is designed to be shared across threads and tasks; all methods
/// take `&self`. There is no in-process write lock: concurrent submitters,
/// including ones in other processes, coordinate solely through conditional
/// writes on the counter record.
///
/// # Example
///
/// ```ignore
/// use txlog::{Config, TxLog, TxRead};
/// use bytes::Bytes;
///
/// let log = TxLog::open(Config::default()).await?;
///
/// let submitted = log
///     .submit(vec![Bytes::from("debit"), Bytes::from("credit")])
///     .await?;
///
/// let mut iter = log.read_after(None).await?;
/// while let Some(tx) = iter.next().await? {
///     println!("{} @ {}: {:?}", tx.tx_id, tx.tx_time_ms, tx.events);
/// }
/// ```
pub struct TxLog {
    storage: TxStorage,
    allocator: TxIdAllocator,
    writer: TxWriter,
    codec: Arc<dyn PayloadCodec>,
    scan: ScanConfig,
}

impl TxLog {
    /// Opens a log with the given configuration and the default codec.
    ///
    /// Nothing is written until the first submit; the counter record is
    /// created lazily.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be initialized.
    pub async fn open(config: Config) -> Result<Self> {
        Self::builder(config).build().await
    }

    pub fn builder(config: Config) -> TxLogBuilder {
        TxLogBuilder::new(config)
    }

    /// Submits a transaction.
    ///
    /// Allocates the next transaction ID, then writes the metadata record and
    /// one record per event. Returns once every record is written.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`](crate::Error::InvalidInput) if `events` has
    ///   more than [`MAX_EVENTS_PER_TX`](crate::MAX_EVENTS_PER_TX) entries.
    ///   Checked before any store access.
    /// - [`Error::Contention`](crate::Error::Contention) if the allocator's
    ///   retry policy ran out.
    /// - [`Error::PartialWrite`](crate::Error::PartialWrite) if writing the
    ///   transaction's records failed.
    /// - [`Error::Storage`](crate::Error::Storage) if allocation hit a store
    ///   failure.
    #[tracing::instrument(level = "debug", skip_all, fields(events = events.len()))]
    pub async fn submit(&self, events: Vec<Bytes>) -> Result<SubmittedTx> {
        validate_event_count(events.len())?;
        let tx_id = self.allocator.allocate_next().await?;
        let submitted = self.writer.write_transaction(tx_id, &events).await?;
        tracing::debug!(tx_id = %submitted.tx_id, "submitted transaction");
        Ok(submitted)
    }

    /// Returns a read-only view sharing this log's store and codec.
    pub fn reader(&self) -> TxLogReader {
        let read = self.storage.as_read();
        TxLogReader::from_storage(read, Arc::clone(&self.codec), self.scan.clone())
    }
}

#[async_trait]
impl TxRead for TxLog {
    async fn read_after_with_options(
        &self,
        after: Option<TxId>,
        options: ReadOptions,
    ) -> Result<TxIterator> {
        let page_size = options.page_size.unwrap_or(self.scan.page_size);
        Ok(TxIterator::new(
            self.storage.as_read(),
            Arc::clone(&self.codec),
            page_size,
            after,
        ))
    }

    async fn latest(&self) -> Result<Option<TxId>> {
        reader::latest(&self.storage.as_read()).await
    }
}

/// Builder for [`TxLog`] with a custom codec, clock or store.
pub struct TxLogBuilder {
    config: Config,
    codec: Arc<dyn PayloadCodec>,
    clock: Arc<dyn Clock>,
    storage: Option<Arc<dyn Storage>>,
}

impl TxLogBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            codec: Arc::new(RawCodec),
            clock: Arc::new(SystemClock),
            storage: None,
        }
    }

    /// Sets the codec for event payloads and the metadata marker.
    ///
    /// Readers must use the same codec.
    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the clock used for transaction timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Uses an existing store instead of creating one from
    /// [`Config::storage`].
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub async fn build(self) -> Result<TxLog> {
        let storage = match self.storage {
            Some(storage) => storage,
            None => common::create_storage(&self.config.storage).await?,
        };
        let storage = TxStorage::new(storage);

        let allocator =
            TxIdAllocator::new(storage.clone(), self.config.allocator.retry_policy.clone());
        let writer = TxWriter::new(storage.clone(), Arc::clone(&self.codec), self.clock);

        Ok(TxLog {
            storage,
            allocator,
            writer,
            codec: self.codec,
            scan: self.config.scan,
        })
    }
}

#[cfg(test)]
mod tests {
    use common::StorageConfig;
    use common::clock::MockClock;

    use super::*;
    use crate::codec::ChecksumCodec;
    use crate::error::Error;
    use crate::txid::MAX_EVENTS_PER_TX;

    fn config() -> Config {
        Config {
            storage: StorageConfig::InMemory,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn should_return_none_as_latest_for_empty_log() {
        // given
        let log = TxLog::open(config()).await.unwrap();

        // when
        let latest = log.latest().await.unwrap();

        // then
        assert_eq!(latest, None);
    }

    #[tokio::test]
    async fn should_report_latest_allocated_id() {
        // given
        let log = TxLog::open(config()).await.unwrap();
        log.submit(vec![Bytes::from("a")]).await.unwrap();
        let second = log.submit(vec![Bytes::from("b")]).await.unwrap();

        // when
        let latest = log.latest().await.unwrap();

        // then
        assert_eq!(latest, Some(second.tx_id));
    }

    #[tokio::test]
    async fn should_stamp_transactions_with_clock_time() {
        // given
        let log = TxLog::builder(config())
            .with_clock(Arc::new(MockClock::with_millis(1_234)))
            .build()
            .await
            .unwrap();

        // when
        let submitted = log.submit(vec![Bytes::from("a")]).await.unwrap();

        // then
        assert_eq!(submitted.tx_time_ms, 1_234);
        let mut iter = log.read_after(None).await.unwrap();
        assert_eq!(iter.next().await.unwrap().unwrap().tx_time_ms, 1_234);
    }

    #[tokio::test]
    async fn should_round_trip_through_checksum_codec() {
        // given
        let log = TxLog::builder(config())
            .with_codec(Arc::new(ChecksumCodec))
            .build()
            .await
            .unwrap();
        log.submit(vec![Bytes::from("payload")]).await.unwrap();

        // when
        let mut iter = log.read_after(None).await.unwrap();
        let tx = iter.next().await.unwrap().unwrap();

        // then
        assert_eq!(tx.events, vec![Bytes::from("payload")]);
    }

    #[tokio::test]
    async fn should_reject_oversized_transaction_without_allocating() {
        // given
        let log = TxLog::open(config()).await.unwrap();

        // when
        let result = log.submit(vec![Bytes::new(); MAX_EVENTS_PER_TX + 1]).await;

        // then
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(log.latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_share_store_with_reader() {
        // given
        let log = TxLog::open(config()).await.unwrap();
        let submitted = log.submit(vec![Bytes::from("a")]).await.unwrap();

        // when
        let reader = log.reader();

        // then
        assert_eq!(reader.latest().await.unwrap(), Some(submitted.tx_id));
        let mut iter = reader
            .read_after_with_options(None, ReadOptions { page_size: Some(1) })
            .await
            .unwrap();
        assert_eq!(iter.next().await.unwrap().unwrap().tx_id, submitted.tx_id);
    }
}
