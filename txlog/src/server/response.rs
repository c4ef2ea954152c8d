//! HTTP response types for the txlog server.

use bytes::Bytes;
use serde::Serialize;
use serde_with::base64::Base64;
use serde_with::serde_as;

use crate::{SubmittedTx, Transaction, TxId};

const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub status: &'static str,
    pub tx_id: u64,
    pub tx_time_ms: i64,
}

impl SubmitResponse {
    pub fn success(submitted: SubmittedTx) -> Self {
        Self {
            status: STATUS_SUCCESS,
            tx_id: submitted.tx_id.as_u64(),
            tx_time_ms: submitted.tx_time_ms,
        }
    }
}

/// One transaction in a read response.
#[serde_as]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
    pub tx_id: u64,
    pub tx_time_ms: i64,
    #[serde_as(as = "Vec<Base64>")]
    pub events: Vec<Bytes>,
    /// `false` while some declared events are not visible.
    pub complete: bool,
}

impl From<Transaction> for TransactionEntry {
    fn from(tx: Transaction) -> Self {
        let complete = tx.is_complete();
        Self {
            tx_id: tx.tx_id.as_u64(),
            tx_time_ms: tx.tx_time_ms,
            events: tx.events,
            complete,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    pub status: &'static str,
    pub transactions: Vec<TransactionEntry>,
    /// Value to pass as `after` to continue reading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_after: Option<u64>,
}

impl ReadResponse {
    pub fn success(transactions: Vec<Transaction>, resume_point: Option<TxId>) -> Self {
        Self {
            status: STATUS_SUCCESS,
            transactions: transactions.into_iter().map(TransactionEntry::from).collect(),
            next_after: resume_point.map(TxId::as_u64),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestResponse {
    pub status: &'static str,
    pub tx_id: Option<u64>,
}

impl LatestResponse {
    pub fn success(tx_id: Option<TxId>) -> Self {
        Self {
            status: STATUS_SUCCESS,
            tx_id: tx_id.map(TxId::as_u64),
        }
    }
}
