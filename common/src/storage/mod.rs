//! Store abstraction for two-part-key, conditionally writable key-value stores.
//!
//! The model mirrors what a schemaless wide-column store offers and nothing
//! more:
//!
//! - every item is addressed by an [`ItemKey`] made of a partition key and a
//!   range key, both `u64`;
//! - single items can be written conditionally ([`Precondition`]), which is
//!   the only synchronization primitive available;
//! - several unconditional items can be written in one call, up to
//!   [`MAX_BATCH_WRITE_RECORDS`];
//! - items of one partition can be read back in range-key order through a
//!   paginated scan ([`ScanRequest`] / [`ScanPage`]).
//!
//! There are no counters, no cross-item transactions and no cross-partition
//! ordering guarantees.

pub mod config;
pub mod dynamodb;
pub mod factory;
pub mod in_memory;
pub mod slate;

use async_trait::async_trait;
use bytes::Bytes;

/// Largest number of records a single [`Storage::write_batch`] call accepts.
pub const MAX_BATCH_WRITE_RECORDS: usize = 25;

/// Default number of records returned per scan page.
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 1000;

/// Two-part primary key of a stored item.
///
/// Items order by partition first, then by range key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub partition: u64,
    pub range_key: u64,
}

impl ItemKey {
    pub const fn new(partition: u64, range_key: u64) -> Self {
        Self {
            partition,
            range_key,
        }
    }
}

/// A stored item: its key plus an opaque value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: ItemKey,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: ItemKey, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// Server-side predicate a conditional write must satisfy to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Write unconditionally.
    None,
    /// Write only if no item exists under the key (insert-if-absent).
    DoesNotExist,
    /// Write only if the current value is exactly the given bytes
    /// (compare-and-swap).
    ValueEquals(Bytes),
}

/// Outcome of a conditional write.
///
/// A failed condition is an expected outcome under contention and is
/// reported here instead of as a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalWrite {
    Applied,
    ConditionFailed,
}

/// One page request of a partition scan.
///
/// Returns items of `partition` whose range key is strictly greater than
/// `exclusive_start_key` (or all items if unset), in ascending range-key
/// order, at most `limit` of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub partition: u64,
    pub exclusive_start_key: Option<u64>,
    pub limit: usize,
}

impl ScanRequest {
    pub fn new(partition: u64) -> Self {
        Self {
            partition,
            exclusive_start_key: None,
            limit: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    pub fn with_exclusive_start_key(mut self, range_key: Option<u64>) -> Self {
        self.exclusive_start_key = range_key;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }
}

/// One page of scan results.
///
/// `last_evaluated_key` is the continuation token: when set, more items may
/// follow and the next page is requested with it as the exclusive start key.
/// When `None`, the partition is exhausted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub records: Vec<Record>,
    pub last_evaluated_key: Option<u64>,
}

/// Error type for storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend reported a failure (I/O, service error, throttling after
    /// the client's own retries).
    Storage(String),
    /// A violated invariant inside the storage layer.
    Internal(String),
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StorageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StorageError {
    /// Wraps a backend error, keeping its message as the cause.
    pub fn from_storage(err: impl std::fmt::Display) -> Self {
        StorageError::Storage(err.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Read operations of a store.
#[async_trait]
pub trait StorageRead: Send + Sync {
    /// Reads one item with strong consistency: the result reflects every
    /// write acknowledged before the call.
    async fn get(&self, key: ItemKey) -> StorageResult<Option<Record>>;

    /// Reads one page of a partition in ascending range-key order.
    async fn scan(&self, request: ScanRequest) -> StorageResult<ScanPage>;
}

/// Read and write operations of a store.
#[async_trait]
pub trait Storage: StorageRead {
    /// Writes a single item if `precondition` holds for its current state.
    async fn put_if(
        &self,
        record: Record,
        precondition: Precondition,
    ) -> StorageResult<ConditionalWrite>;

    /// Writes up to [`MAX_BATCH_WRITE_RECORDS`] items unconditionally.
    ///
    /// The call either stores every record or fails; backends resubmit items
    /// the service left unprocessed before returning.
    async fn write_batch(&self, records: Vec<Record>) -> StorageResult<()>;
}

/// Rejects batches the store would refuse.
pub(crate) fn check_batch_size(records: &[Record]) -> StorageResult<()> {
    if records.len() > MAX_BATCH_WRITE_RECORDS {
        return Err(StorageError::Internal(format!(
            "batch of {} records exceeds the limit of {}",
            records.len(),
            MAX_BATCH_WRITE_RECORDS
        )));
    }
    Ok(())
}
