//! HTTP request types for the txlog server.

use bytes::Bytes;
use serde::Deserialize;
use serde_with::base64::Base64;
use serde_with::serde_as;

use crate::{Error, TxId};

/// Default number of transactions returned by a read.
const DEFAULT_READ_LIMIT: usize = 100;

/// Largest number of transactions a single read may request.
const MAX_READ_LIMIT: usize = 1000;

/// Body of `POST /api/v1/txlog/submit`.
///
/// ```json
/// { "events": ["ZXZlbnQtMQ==", "ZXZlbnQtMg=="] }
/// ```
#[serde_as]
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Event payloads, base64-encoded.
    #[serde_as(as = "Vec<Base64>")]
    pub events: Vec<Bytes>,
}

impl SubmitRequest {
    pub fn from_body(body: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(body)
            .map_err(|e| Error::InvalidInput(format!("invalid submit request: {}", e)))
    }
}

/// Query parameters for read requests.
#[derive(Debug, Deserialize)]
pub struct ReadParams {
    /// Return transactions strictly after this ID. Reads from the start when
    /// omitted.
    pub after: Option<u64>,
    /// Maximum number of transactions to return.
    pub limit: Option<usize>,
}

impl ReadParams {
    pub fn after(&self) -> Option<TxId> {
        self.after.map(TxId::from)
    }

    pub fn limit(&self) -> Result<usize, Error> {
        match self.limit {
            None => Ok(DEFAULT_READ_LIMIT),
            Some(0) => Err(Error::InvalidInput("limit must be positive".to_string())),
            Some(limit) => Ok(limit.min(MAX_READ_LIMIT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_decode_base64_events() {
        // given
        let body = br#"{"events":["ZXZlbnQtMQ==",""]}"#;

        // when
        let request = SubmitRequest::from_body(body).unwrap();

        // then
        assert_eq!(request.events, vec![Bytes::from("event-1"), Bytes::new()]);
    }

    #[test]
    fn should_reject_invalid_base64() {
        let result = SubmitRequest::from_body(br#"{"events":["not base64!"]}"#);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn should_clamp_read_limit() {
        let params = ReadParams {
            after: None,
            limit: Some(5000),
        };
        assert_eq!(params.limit().unwrap(), MAX_READ_LIMIT);

        let params = ReadParams {
            after: Some(3),
            limit: None,
        };
        assert_eq!(params.limit().unwrap(), DEFAULT_READ_LIMIT);
        assert_eq!(params.after(), Some(TxId::from(3)));
    }

    #[test]
    fn should_reject_zero_limit() {
        let params = ReadParams {
            after: None,
            limit: Some(0),
        };
        assert!(matches!(params.limit(), Err(Error::InvalidInput(_))));
    }
}
