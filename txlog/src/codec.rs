//! Pluggable payload encoding.
//!
//! Every event payload and the metadata marker pass through a
//! [`PayloadCodec`] on their way to and from the store, so the on-disk payload
//! format is chosen by whoever opens the log.

use bytes::{BufMut, Bytes, BytesMut};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Error, Result};

/// Encodes payloads for storage and decodes them back.
///
/// `decode(encode(p))` must return `p`.
pub trait PayloadCodec: Send + Sync + std::fmt::Debug {
    fn encode(&self, payload: &[u8]) -> Bytes;

    fn decode(&self, data: &[u8]) -> Result<Bytes>;
}

/// Stores payloads as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl PayloadCodec for RawCodec {
    fn encode(&self, payload: &[u8]) -> Bytes {
        Bytes::copy_from_slice(payload)
    }

    fn decode(&self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

/// Prefixes payloads with their xxh3-64 checksum and verifies it on decode.
///
/// ```text
/// | checksum (u64 BE) | payload |
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumCodec;

const CHECKSUM_LEN: usize = 8;

impl PayloadCodec for ChecksumCodec {
    fn encode(&self, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(CHECKSUM_LEN + payload.len());
        buf.put_u64(xxh3_64(payload));
        buf.put_slice(payload);
        buf.freeze()
    }

    fn decode(&self, data: &[u8]) -> Result<Bytes> {
        let Some((checksum, payload)) = data.split_first_chunk::<CHECKSUM_LEN>() else {
            return Err(Error::Encoding(format!(
                "payload too short for checksum: {} bytes",
                data.len()
            )));
        };
        let expected = u64::from_be_bytes(*checksum);
        let actual = xxh3_64(payload);
        if expected != actual {
            return Err(Error::Encoding(format!(
                "checksum mismatch: expected {:016x}, got {:016x}",
                expected, actual
            )));
        }
        Ok(Bytes::copy_from_slice(payload))
    }
}
