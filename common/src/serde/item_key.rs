//! Byte encoding of [`ItemKey`] for ordered byte-keyed stores.
//!
//! ```text
//! | partition (u64 BE) | range_key (u64 BE) |
//! ```
//!
//! Big-endian fixed-width fields make lexicographic byte order identical to
//! `(partition, range_key)` order, so a byte-range scan over an LSM tree
//! returns items exactly as a two-part-key store would.

use bytes::{BufMut, Bytes, BytesMut};

use super::DeserializeError;
use crate::storage::ItemKey;

pub const ENCODED_LEN: usize = 16;

pub fn serialize(key: ItemKey) -> Bytes {
    let mut buf = BytesMut::with_capacity(ENCODED_LEN);
    buf.put_u64(key.partition);
    buf.put_u64(key.range_key);
    buf.freeze()
}

pub fn deserialize(data: &[u8]) -> Result<ItemKey, DeserializeError> {
    if data.len() != ENCODED_LEN {
        return Err(DeserializeError::new(format!(
            "invalid item key length: expected {}, got {}",
            ENCODED_LEN,
            data.len()
        )));
    }
    let mut partition = [0u8; 8];
    let mut range_key = [0u8; 8];
    partition.copy_from_slice(&data[..8]);
    range_key.copy_from_slice(&data[8..]);
    Ok(ItemKey::new(
        u64::from_be_bytes(partition),
        u64::from_be_bytes(range_key),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_preserve_key_order_in_bytes() {
        // given
        let keys = [
            ItemKey::new(0, 0),
            ItemKey::new(0, 1),
            ItemKey::new(0, u64::MAX),
            ItemKey::new(1, 0),
            ItemKey::new(256, 7),
        ];

        // when
        let encoded: Vec<Bytes> = keys.iter().map(|k| serialize(*k)).collect();

        // then
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn should_decode_encoded_key() {
        // given
        let key = ItemKey::new(42, (3 << 17) | 5);

        // when
        let decoded = deserialize(&serialize(key)).unwrap();

        // then
        assert_eq!(decoded, key);
    }

    #[test]
    fn should_reject_wrong_length() {
        // when
        let result = deserialize(&[0u8; 15]);

        // then
        assert!(result.is_err());
    }
}
