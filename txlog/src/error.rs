//! Error types for txlog operations.
//!
//! This module defines [`Error`], the primary error type for all log
//! operations, along with a convenient [`Result`] type alias.

use common::StorageError;

use crate::txid::TxId;

/// Error type for txlog operations.
///
/// # Error Categories
///
/// - [`Storage`](Error::Storage): the store reported a failure. Not retried
///   by the log; transport-level retries belong to the store client.
/// - [`Encoding`](Error::Encoding): a stored record could not be decoded.
/// - [`InvalidInput`](Error::InvalidInput): the caller passed arguments the
///   log rejects, such as too many events for one transaction. Nothing was
///   written.
/// - [`Contention`](Error::Contention): the allocator lost every
///   compare-and-swap round its retry policy allowed.
/// - [`PartialWrite`](Error::PartialWrite): writing a transaction's records
///   failed after its ID was allocated; any prefix of them may be visible.
/// - [`Internal`](Error::Internal): invariant violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Storage-related errors from the underlying store.
    Storage(String),

    /// Encoding or decoding errors.
    Encoding(String),

    /// Invalid input or parameter errors.
    InvalidInput(String),

    /// The counter record stayed contended for the whole retry budget.
    Contention(String),

    /// A transaction may be partially visible.
    ///
    /// At least the first `batches_written` of `total_batches` batches are in
    /// the store. The failed batch may have been applied in part. Readers see
    /// the transaction with a truncated event list (see
    /// [`Transaction::is_complete`](crate::Transaction::is_complete)), or not
    /// at all if its metadata record is missing. There is no rollback.
    PartialWrite {
        tx_id: TxId,
        batches_written: usize,
        total_batches: usize,
        cause: String,
    },

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::Contention(msg) => write!(f, "Contention: {}", msg),
            Error::PartialWrite {
                tx_id,
                batches_written,
                total_batches,
                cause,
            } => write!(
                f,
                "Partial write of transaction {}: {} of {} batches written: {}",
                tx_id, batches_written, total_batches, cause
            ),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Storage(msg) => Error::Storage(msg),
            StorageError::Internal(msg) => Error::Internal(msg),
        }
    }
}

/// Result type alias for txlog operations.
pub type Result<T> = std::result::Result<T, Error>;
