//! Key/value pair codec for leaf nodes.

use bytes::{BufMut, Bytes, BytesMut};

/// A key/value pair stored in a leaf node.
///
/// On disk a pair is `[key_len: u16 LE][value_len: u16 LE][key][value]`,
/// so both key and value are limited to 65,535 bytes by the format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: Bytes,
    pub value: Bytes,
}

impl Pair {
    /// Creates a pair by copying the given key and value.
    pub fn new(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: Bytes::copy_from_slice(key),
            value: Bytes::copy_from_slice(value),
        }
    }

    /// Returns the encoded size of a pair with the given key and value
    /// lengths.
    pub fn encoded_size(key_len: usize, value_len: usize) -> usize {
        4 + key_len + value_len
    }

    /// Returns the encoded size of this pair.
    pub fn size_on_disk(&self) -> usize {
        Self::encoded_size(self.key.len(), self.value.len())
    }

    /// Serializes this pair.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size_on_disk());
        buf.put_u16_le(self.key.len() as u16);
        buf.put_u16_le(self.value.len() as u16);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);
        buf.freeze()
    }

    /// Deserializes a pair from the start of `data`.
    pub fn from_bytes(data: &[u8]) -> Pair {
        let key_len = u16::from_le_bytes([data[0], data[1]]) as usize;
        let value_len = u16::from_le_bytes([data[2], data[3]]) as usize;
        Pair {
            key: Bytes::copy_from_slice(&data[4..4 + key_len]),
            value: Bytes::copy_from_slice(&data[4 + key_len..4 + key_len + value_len]),
        }
    }
}

/// Encodes a pair directly into `buf`, which must be exactly
/// `Pair::encoded_size(key.len(), value.len())` bytes.
pub fn encode_into(buf: &mut [u8], key: &[u8], value: &[u8]) {
    debug_assert_eq!(buf.len(), Pair::encoded_size(key.len(), value.len()));
    buf[0..2].copy_from_slice(&(key.len() as u16).to_le_bytes());
    buf[2..4].copy_from_slice(&(value.len() as u16).to_le_bytes());
    buf[4..4 + key.len()].copy_from_slice(key);
    buf[4 + key.len()..].copy_from_slice(value);
}
