//! Configuration options for txlog operations.

use std::time::Duration;

use common::{RetryPolicy, StorageConfig};
use serde::{Deserialize, Serialize};

/// Configuration for opening a [`TxLog`](crate::TxLog).
///
/// # Example
///
/// ```ignore
/// use txlog::{Config, TxLog};
/// use common::StorageConfig;
///
/// let config = Config {
///     storage: StorageConfig::InMemory,
///     ..Default::default()
/// };
/// let log = TxLog::open(config).await?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend configuration.
    ///
    /// See [`StorageConfig`] for the in-memory, SlateDB and DynamoDB
    /// backends.
    pub storage: StorageConfig,

    /// Sequence allocator configuration.
    pub allocator: AllocatorConfig,

    /// Read path configuration.
    pub scan: ScanConfig,
}

/// Configuration of the sequence allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Backoff between compare-and-swap attempts on the counter record.
    ///
    /// The default grows from 50ms by 1.5x per collision up to 30s and never
    /// gives up. Set `max_attempts` to fail with
    /// [`Error::Contention`](crate::Error::Contention) instead, or bound the
    /// caller with a timeout: dropping an allocation future abandons it
    /// between store calls.
    pub retry_policy: RetryPolicy,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::exponential(
                Duration::from_millis(50),
                1.5,
                None,
                Some(Duration::from_secs(30)),
            ),
        }
    }
}

/// Configuration of the read path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Records requested per scan page.
    pub page_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: common::storage::DEFAULT_SCAN_PAGE_SIZE,
        }
    }
}

/// Options for read operations.
///
/// Controls the behavior of
/// [`TxRead::read_after_with_options`](crate::TxRead::read_after_with_options).
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Records requested per scan page, overriding [`ScanConfig::page_size`].
    pub page_size: Option<usize>,
}
