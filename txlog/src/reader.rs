//! Read access to the log and the [`TxRead`] trait.
//!
//! This module provides:
//! - [`TxRead`]: the trait defining read operations on the log.
//! - [`TxLogReader`]: a read-only view of the log that implements `TxRead`.
//! - [`TxIterator`]: the lazy, resumable sequence of transactions returned by
//!   reads.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{Record, StorageRead};
use futures::Stream;

use crate::codec::{PayloadCodec, RawCodec};
use crate::config::{Config, ReadOptions, ScanConfig};
use crate::error::Result;
use crate::model::Transaction;
use crate::serde::TxMetaValue;
use crate::storage::TxStorageRead;
use crate::txid::{MAX_EVENTS_PER_TX, TxId, offset_of, tx_index_of};

/// Trait for read operations on the log.
///
/// Implemented by [`TxLog`](crate::TxLog) and [`TxLogReader`], so consumers
/// can be written against either.
///
/// # Example
///
/// ```ignore
/// use txlog::TxRead;
///
/// async fn tail(reader: &impl TxRead, after: Option<TxId>) -> Result<Option<TxId>> {
///     let mut iter = reader.read_after(after).await?;
///     while let Some(tx) = iter.next().await? {
///         println!("{}: {} events", tx.tx_id, tx.events.len());
///     }
///     Ok(iter.resume_point())
/// }
/// ```
#[async_trait]
pub trait TxRead {
    /// Reads transactions strictly after `after`, or from the beginning of the
    /// log when `None`.
    ///
    /// The returned iterator is lazy. Transactions written after the iterator
    /// was created may or may not be returned; to pick them up later, read
    /// again from [`TxIterator::resume_point`].
    async fn read_after(&self, after: Option<TxId>) -> Result<TxIterator> {
        self.read_after_with_options(after, ReadOptions::default())
            .await
    }

    /// Reads transactions strictly after `after` with custom options.
    async fn read_after_with_options(
        &self,
        after: Option<TxId>,
        options: ReadOptions,
    ) -> Result<TxIterator>;

    /// Returns the most recently allocated transaction ID, or `None` for an
    /// empty log.
    ///
    /// The transaction may still be in the middle of being written.
    async fn latest(&self) -> Result<Option<TxId>>;
}

/// A read-only view of the log.
///
/// Holds no allocator or writer. Any number of readers can run alongside
/// writers, in the same process or elsewhere.
pub struct TxLogReader {
    storage: TxStorageRead,
    codec: Arc<dyn PayloadCodec>,
    scan: ScanConfig,
}

impl TxLogReader {
    /// Opens a reader over the store described by `config`, decoding payloads
    /// as written by [`RawCodec`].
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_codec(config, Arc::new(RawCodec)).await
    }

    pub async fn open_with_codec(config: Config, codec: Arc<dyn PayloadCodec>) -> Result<Self> {
        let storage = common::create_storage(&config.storage).await?;
        Ok(Self::new(storage, codec, config.scan))
    }

    /// Creates a reader over an existing store.
    pub fn new(
        storage: Arc<dyn StorageRead>,
        codec: Arc<dyn PayloadCodec>,
        scan: ScanConfig,
    ) -> Self {
        Self::from_storage(TxStorageRead::new(storage), codec, scan)
    }

    pub(crate) fn from_storage(
        storage: TxStorageRead,
        codec: Arc<dyn PayloadCodec>,
        scan: ScanConfig,
    ) -> Self {
        Self {
            storage,
            codec,
            scan,
        }
    }
}

#[async_trait]
impl TxRead for TxLogReader {
    async fn read_after_with_options(
        &self,
        after: Option<TxId>,
        options: ReadOptions,
    ) -> Result<TxIterator> {
        let page_size = options.page_size.unwrap_or(self.scan.page_size);
        Ok(TxIterator::new(
            self.storage.clone(),
            Arc::clone(&self.codec),
            page_size,
            after,
        ))
    }

    async fn latest(&self) -> Result<Option<TxId>> {
        latest(&self.storage).await
    }
}

pub(crate) async fn latest(storage: &TxStorageRead) -> Result<Option<TxId>> {
    Ok(storage
        .get_counter()
        .await?
        .map(|counter| counter.value.tx_id()))
}

/// Records of one transaction collected so far.
struct PendingTx {
    partition: u64,
    index: u64,
    records: Vec<Record>,
}

/// Lazy, resumable iterator over transactions in ID order.
///
/// The iterator scans one partition at a time, page by page, grouping records
/// by transaction. When a partition is exhausted it reads the counter record
/// and moves on to the next partition only if the counter has reached it.
/// Memory use is bounded by one scan page plus one transaction.
///
/// Once [`next`](TxIterator::next) returns `Ok(None)` or an error, the
/// iterator is finished and keeps returning `Ok(None)`. Continue reading with
/// a fresh iterator from [`resume_point`](TxIterator::resume_point).
pub struct TxIterator {
    storage: TxStorageRead,
    codec: Arc<dyn PayloadCodec>,
    page_size: usize,
    partition: u64,
    exclusive_start_key: Option<u64>,
    partition_exhausted: bool,
    buffered: VecDeque<Record>,
    pending: Option<PendingTx>,
    resume_point: Option<TxId>,
    finished: bool,
}

impl TxIterator {
    pub(crate) fn new(
        storage: TxStorageRead,
        codec: Arc<dyn PayloadCodec>,
        page_size: usize,
        after: Option<TxId>,
    ) -> Self {
        let (partition, exclusive_start_key) = match after {
            Some(id) => (id.partition(), Some(id.range_key_end())),
            None => (0, None),
        };
        Self {
            storage,
            codec,
            page_size: page_size.max(1),
            partition,
            exclusive_start_key,
            partition_exhausted: false,
            buffered: VecDeque::new(),
            pending: None,
            resume_point: after,
            finished: false,
        }
    }

    /// Returns the next transaction, or `None` when no more are visible.
    pub async fn next(&mut self) -> Result<Option<Transaction>> {
        if self.finished {
            return Ok(None);
        }
        let result = self.advance().await;
        match &result {
            Ok(Some(tx)) => self.resume_point = Some(tx.tx_id),
            Ok(None) | Err(_) => self.finished = true,
        }
        result
    }

    /// ID of the last transaction returned or skipped, or the ID the read
    /// started after.
    ///
    /// `read_after(resume_point)` continues exactly where this iterator
    /// stopped.
    pub fn resume_point(&self) -> Option<TxId> {
        self.resume_point
    }

    /// Converts the iterator into a [`Stream`].
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Transaction>> + Send {
        futures::stream::unfold(self, |mut iter| async move {
            match iter.next().await {
                Ok(Some(tx)) => Some((Ok(tx), iter)),
                Ok(None) => None,
                Err(err) => Some((Err(err), iter)),
            }
        })
    }

    async fn advance(&mut self) -> Result<Option<Transaction>> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                let index = tx_index_of(record.key.range_key);
                if let Some(pending) = self.pending.as_mut().filter(|p| p.index == index) {
                    pending.records.push(record);
                    continue;
                }
                let started = PendingTx {
                    partition: self.partition,
                    index,
                    records: vec![record],
                };
                let Some(done) = self.pending.replace(started) else {
                    continue;
                };
                if let Some(tx) = self.assemble(done)? {
                    return Ok(Some(tx));
                }
                continue;
            }

            if !self.partition_exhausted {
                let page = self
                    .storage
                    .scan_partition(self.partition, self.exclusive_start_key, self.page_size)
                    .await?;
                self.exclusive_start_key = page.last_evaluated_key;
                self.partition_exhausted = page.last_evaluated_key.is_none();
                self.buffered.extend(page.records);
                continue;
            }

            // No record of a later transaction can follow in this partition.
            if let Some(done) = self.pending.take() {
                match self.assemble(done)? {
                    Some(tx) => return Ok(Some(tx)),
                    None => continue,
                }
            }

            let Some(counter) = self.storage.get_counter().await? else {
                return Ok(None);
            };
            if self.partition >= counter.value.partition {
                return Ok(None);
            }
            self.partition += 1;
            self.exclusive_start_key = None;
            self.partition_exhausted = false;
            tracing::debug!(partition = self.partition, "reader crossed into next partition");
        }
    }

    /// Builds a transaction from its records.
    ///
    /// A group whose metadata record is missing is skipped, and events after
    /// a gap in the offsets are dropped. Both come from batches the store
    /// applied only in part. Skipped groups still advance the resume point so
    /// a later read does not stop on them again.
    fn assemble(&mut self, pending: PendingTx) -> Result<Option<Transaction>> {
        let tx_id = TxId::new(pending.partition, pending.index);
        let mut records = pending.records.into_iter();

        let meta = match records.next() {
            Some(record) if offset_of(record.key.range_key) == 0 => {
                TxMetaValue::deserialize(&record.value, self.codec.as_ref())?
            }
            _ => {
                tracing::warn!(%tx_id, "skipping transaction without metadata record");
                self.resume_point = Some(tx_id);
                return Ok(None);
            }
        };

        let mut events: Vec<Bytes> =
            Vec::with_capacity((meta.event_count as usize).min(MAX_EVENTS_PER_TX));
        for (expected_offset, record) in (1u64..).zip(records) {
            if offset_of(record.key.range_key) != expected_offset {
                tracing::warn!(
                    %tx_id,
                    missing_offset = expected_offset,
                    "transaction has a gap in its events, returning the prefix"
                );
                break;
            }
            events.push(self.codec.decode(&record.value)?);
        }

        Ok(Some(Transaction {
            tx_id,
            tx_time_ms: meta.tx_time_ms,
            events,
            event_count: meta.event_count,
        }))
    }
}
