//! Transaction identifiers and their mapping onto the store's key space.
//!
//! A [`TxId`] packs a partition and an intra-partition transaction index into
//! one `u64`:
//!
//! ```text
//! | partition (49 bits) | tx index (14 bits) |
//! ```
//!
//! Inside a partition, each transaction owns a block of 2^17 range keys
//! starting at `index << 17`. Offset 0 holds the metadata record, offsets
//! `1..=131070` hold events, and the last slot of the block is never written
//! so that `range_key_end` can serve as an exclusive scan start.

use serde::{Deserialize, Serialize};

/// Number of bits used for the intra-partition transaction index.
pub const TX_INDEX_BITS: u32 = 14;

/// Number of bits used for the partition.
pub const PARTITION_BITS: u32 = 49;

/// Number of low range-key bits reserved for a transaction's records.
pub const EVENT_OFFSET_BITS: u32 = 17;

/// Largest intra-partition transaction index.
pub const MAX_TX_INDEX: u64 = (1 << TX_INDEX_BITS) - 1;

/// Largest legal partition.
pub const MAX_PARTITION: u64 = (1 << PARTITION_BITS) - 1;

/// Partition of the counter record, one past the legal partition range.
pub const COUNTER_PARTITION: u64 = MAX_PARTITION + 1;

/// Range key of the counter record.
pub const COUNTER_RANGE_KEY: u64 = 0;

const EVENT_OFFSET_MASK: u64 = (1 << EVENT_OFFSET_BITS) - 1;

/// Largest event offset. Offset 0 is the metadata record.
pub const MAX_EVENT_OFFSET: u64 = EVENT_OFFSET_MASK - 1;

/// Largest number of events a single transaction may carry.
pub const MAX_EVENTS_PER_TX: usize = MAX_EVENT_OFFSET as usize;

/// Logical transaction identifier.
///
/// Identifiers are strictly increasing in allocation order, and their numeric
/// order matches `(partition, index)` lexicographic order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TxId(u64);

impl TxId {
    /// Packs `(partition, index)` into an identifier.
    ///
    /// `index` must be at most [`MAX_TX_INDEX`] and `partition` at most
    /// [`MAX_PARTITION`]; callers validate.
    pub const fn new(partition: u64, index: u64) -> Self {
        debug_assert!(index <= MAX_TX_INDEX);
        debug_assert!(partition <= MAX_PARTITION);
        TxId((partition << TX_INDEX_BITS) | index)
    }

    pub const fn from_u64(value: u64) -> Self {
        TxId(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Splits the identifier back into `(partition, index)`.
    pub const fn decode(self) -> (u64, u64) {
        (self.partition(), self.index())
    }

    pub const fn partition(self) -> u64 {
        self.0 >> TX_INDEX_BITS
    }

    pub const fn index(self) -> u64 {
        self.0 & MAX_TX_INDEX
    }

    /// First range key of this transaction's block, the metadata record.
    pub const fn range_key_start(self) -> u64 {
        range_key_start(self.index())
    }

    /// Last range key of this transaction's block.
    ///
    /// Scanning with this as the exclusive start key resumes strictly after
    /// the transaction.
    pub const fn range_key_end(self) -> u64 {
        range_key_end(self.index())
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TxId {
    fn from(value: u64) -> Self {
        TxId(value)
    }
}

impl From<TxId> for u64 {
    fn from(id: TxId) -> Self {
        id.0
    }
}

pub const fn range_key_start(index: u64) -> u64 {
    index << EVENT_OFFSET_BITS
}

pub const fn range_key_end(index: u64) -> u64 {
    (index << EVENT_OFFSET_BITS) | EVENT_OFFSET_MASK
}

/// Range key of the record at `offset` within transaction `index`.
pub const fn item_key(index: u64, offset: u64) -> u64 {
    debug_assert!(offset <= MAX_EVENT_OFFSET);
    (index << EVENT_OFFSET_BITS) | offset
}

/// Transaction index owning a range key.
pub const fn tx_index_of(range_key: u64) -> u64 {
    range_key >> EVENT_OFFSET_BITS
}

/// Offset of a range key within its transaction's block.
pub const fn offset_of(range_key: u64) -> u64 {
    range_key & EVENT_OFFSET_MASK
}
