//! Shared building blocks for the txlog system.
//!
//! This crate holds everything the log needs from its environment but which is
//! not specific to the log itself:
//!
//! - [`storage`]: the two-part-key store abstraction ([`Storage`], [`StorageRead`])
//!   with conditional writes, batch writes and paginated partition scans, plus
//!   in-memory, SlateDB and DynamoDB backends.
//! - [`retry`]: the [`RetryPolicy`] used for backoff loops.
//! - [`clock`]: wall-clock abstraction so timestamps can be controlled in tests.

pub mod clock;
pub mod retry;
pub mod serde;
pub mod storage;

pub use clock::Clock;
pub use retry::{RetryIter, RetryPolicy};
pub use storage::config::StorageConfig;
pub use storage::factory::create_storage;
pub use storage::{
    ConditionalWrite, ItemKey, MAX_BATCH_WRITE_RECORDS, Precondition, Record, ScanPage,
    ScanRequest, Storage, StorageError, StorageRead, StorageResult,
};
