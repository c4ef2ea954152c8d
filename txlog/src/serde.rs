//! Value encodings for the records txlog keeps in the store.
//!
//! # Counter record
//!
//! ```text
//! | partition (u64 BE) | tx index (u64 BE) |
//! ```
//!
//! The encoding is deterministic, which the allocator relies on: its
//! compare-and-swap compares the stored bytes against the bytes it read.
//!
//! # Metadata record
//!
//! ```text
//! | tx_time_ms (i64 BE) | event_count (u32 BE) | marker |
//! ```
//!
//! `marker` is [`TX_MARKER`] passed through the log's codec. Reading it back
//! through the same codec checks that the record was written by a compatible
//! log.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::PayloadCodec;
use crate::error::{Error, Result};
use crate::txid::{MAX_PARTITION, MAX_TX_INDEX, TxId};

/// Marker stored in every metadata record.
pub const TX_MARKER: &[u8] = b"txlog/tx";

/// Decoded value of the counter record: the last allocated position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterValue {
    pub partition: u64,
    pub tx_index: u64,
}

impl CounterValue {
    const ENCODED_LEN: usize = 16;

    pub fn new(partition: u64, tx_index: u64) -> Self {
        Self {
            partition,
            tx_index,
        }
    }

    /// The position following this one, rolling into the next partition
    /// after [`MAX_TX_INDEX`].
    pub fn successor(self) -> Self {
        if self.tx_index < MAX_TX_INDEX {
            Self::new(self.partition, self.tx_index + 1)
        } else {
            Self::new(self.partition + 1, 0)
        }
    }

    pub fn tx_id(self) -> TxId {
        TxId::new(self.partition, self.tx_index)
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::ENCODED_LEN);
        buf.put_u64(self.partition);
        buf.put_u64(self.tx_index);
        buf.freeze()
    }

    pub fn deserialize(mut data: &[u8]) -> Result<Self> {
        if data.len() != Self::ENCODED_LEN {
            return Err(Error::Encoding(format!(
                "counter record must be {} bytes, got {}",
                Self::ENCODED_LEN,
                data.len()
            )));
        }
        let partition = data.get_u64();
        let tx_index = data.get_u64();
        if partition > MAX_PARTITION || tx_index > MAX_TX_INDEX {
            return Err(Error::Encoding(format!(
                "counter record out of range: partition={}, tx_index={}",
                partition, tx_index
            )));
        }
        Ok(Self::new(partition, tx_index))
    }
}

/// Decoded value of a transaction's metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxMetaValue {
    pub tx_time_ms: i64,
    pub event_count: u32,
}

impl TxMetaValue {
    const HEADER_LEN: usize = 12;

    pub fn new(tx_time_ms: i64, event_count: u32) -> Self {
        Self {
            tx_time_ms,
            event_count,
        }
    }

    pub fn serialize(&self, codec: &dyn PayloadCodec) -> Bytes {
        let marker = codec.encode(TX_MARKER);
        let mut buf = BytesMut::with_capacity(Self::HEADER_LEN + marker.len());
        buf.put_i64(self.tx_time_ms);
        buf.put_u32(self.event_count);
        buf.put_slice(&marker);
        buf.freeze()
    }

    pub fn deserialize(mut data: &[u8], codec: &dyn PayloadCodec) -> Result<Self> {
        if data.len() < Self::HEADER_LEN {
            return Err(Error::Encoding(format!(
                "metadata record too short: {} bytes",
                data.len()
            )));
        }
        let tx_time_ms = data.get_i64();
        let event_count = data.get_u32();
        let marker = codec.decode(data)?;
        if marker.as_ref() != TX_MARKER {
            return Err(Error::Encoding("metadata record has unknown marker".into()));
        }
        Ok(Self::new(tx_time_ms, event_count))
    }
}
