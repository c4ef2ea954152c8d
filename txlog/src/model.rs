//! Core data types for txlog.

use bytes::Bytes;

use crate::txid::TxId;

/// Result of a successful [`TxLog::submit`](crate::TxLog::submit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedTx {
    /// Identifier allocated to the transaction.
    pub tx_id: TxId,
    /// Wall-clock time recorded in the metadata record (ms since epoch).
    pub tx_time_ms: i64,
}

/// A transaction reconstructed from the store.
///
/// # Partial visibility
///
/// A transaction's records become visible batch by batch. A reader racing a
/// writer, or reading after a failed write, may observe the metadata record
/// and only a prefix of the events. [`is_complete`](Transaction::is_complete)
/// compares the events found against the count declared in the metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub tx_id: TxId,
    pub tx_time_ms: i64,
    /// Event payloads in submission order.
    pub events: Vec<Bytes>,
    /// Number of events declared by the metadata record.
    pub event_count: u32,
}

impl Transaction {
    /// Returns `true` if every declared event was read.
    pub fn is_complete(&self) -> bool {
        self.events.len() == self.event_count as usize
    }
}
