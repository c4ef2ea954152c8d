//! txlog - an append-only, totally ordered transaction log.
//!
//! txlog turns a key-value store that only offers single-item conditional
//! writes, small batch writes and per-partition range scans into one ordered
//! log of transactions. Each transaction is an ordered list of opaque event
//! payloads.
//!
//! # Architecture
//!
//! - **Transaction IDs** ([`TxId`]) pack a 49-bit partition and a 14-bit
//!   intra-partition index into a `u64`. Each transaction owns a contiguous
//!   block of range keys in its partition: a metadata record followed by one
//!   record per event.
//! - **Allocation** goes through a single counter record stored outside the
//!   legal partition range and advanced by compare-and-swap. Losers of a race
//!   back off and retry; no in-process locks are involved, so any number of
//!   writers in any number of processes can share a log.
//! - **Writes** go out in batches of 25 records, in order, so a failed write
//!   leaves a prefix of the transaction behind.
//! - **Reads** scan one partition at a time and move to the next one only if
//!   the counter has reached it.
//!
//! # Example
//!
//! ```ignore
//! use txlog::{Config, TxLog, TxRead};
//! use bytes::Bytes;
//!
//! let log = TxLog::open(Config::default()).await?;
//! log.submit(vec![Bytes::from("order-created"), Bytes::from("stock-reserved")]).await?;
//!
//! let mut iter = log.read_after(None).await?;
//! while let Some(tx) = iter.next().await? {
//!     println!("tx={} events={}", tx.tx_id, tx.events.len());
//! }
//! let checkpoint = iter.resume_point();
//! ```

mod codec;
mod config;
mod error;
mod log;
mod model;
mod reader;
mod sequence;
mod serde;
#[cfg(feature = "http-server")]
pub mod server;
mod storage;
pub mod txid;
mod writer;

pub use codec::{ChecksumCodec, PayloadCodec, RawCodec};
pub use config::{AllocatorConfig, Config, ReadOptions, ScanConfig};
pub use error::{Error, Result};
pub use log::{TxLog, TxLogBuilder};
pub use model::{SubmittedTx, Transaction};
pub use reader::{TxIterator, TxLogReader, TxRead};
pub use txid::{MAX_EVENTS_PER_TX, TxId};
