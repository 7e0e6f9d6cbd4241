//! Key encoding for rows and index entries.
//!
//! Row key: `[b'r'][table_id (8, BE)][row_id (8, BE)]`
//!
//! Index key: `[b'i'][index_id (8, BE)][encoded values...][row_id (8, BE)]`
//!
//! Big-endian ids keep a table's rows in insertion order, and the value
//! encoding is order-preserving and prefix-free so equality lookups are
//! prefix scans.

use crate::value::Value;

/// Tag byte for row records.
pub const ROW_TAG: u8 = b'r';

/// Tag byte for index entries.
pub const INDEX_TAG: u8 = b'i';

/// Size of a row id suffix.
pub const ROW_ID_SIZE: usize = 8;

/// Prefix covering every row of a table.
pub fn table_prefix(table_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8);
    key.push(ROW_TAG);
    key.extend_from_slice(&table_id.to_be_bytes());
    key
}

/// Key of a single row.
pub fn row_key(table_id: u64, row_id: u64) -> Vec<u8> {
    let mut key = table_prefix(table_id);
    key.extend_from_slice(&row_id.to_be_bytes());
    key
}

/// Prefix covering every entry of an index.
pub fn index_prefix(index_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8);
    key.push(INDEX_TAG);
    key.extend_from_slice(&index_id.to_be_bytes());
    key
}

/// Prefix covering the entries of an index with the given leading values.
pub fn index_value_prefix(index_id: u64, values: &[&Value]) -> Vec<u8> {
    let mut key = index_prefix(index_id);
    for value in values {
        encode_value_sortable_into(value, &mut key);
    }
    key
}

/// Key of a single index entry.
pub fn index_key(index_id: u64, values: &[&Value], row_id: u64) -> Vec<u8> {
    let mut key = index_value_prefix(index_id, values);
    key.extend_from_slice(&row_id.to_be_bytes());
    key
}

/// Extract the trailing row id from a row or index key.
pub fn decode_row_id(key: &[u8]) -> Option<u64> {
    if key.len() < 1 + 8 + ROW_ID_SIZE {
        return None;
    }
    let mut buf = [0u8; ROW_ID_SIZE];
    buf.copy_from_slice(&key[key.len() - ROW_ID_SIZE..]);
    Some(u64::from_be_bytes(buf))
}

/// Encode a value in a sortable, self-delimiting format.
///
/// - Integers: sign bit flipped, big-endian
/// - Floats: IEEE 754 bits with sign handling
/// - Strings/bytes: `0x00` escaped as `0x00 0xFF`, terminated by `0x00 0x01`
fn encode_value_sortable_into(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null => buf.push(0x00),
        Value::Bool(b) => {
            buf.push(0x01);
            buf.push(u8::from(*b));
        }
        Value::Int64(i) => {
            buf.push(0x02);
            buf.extend_from_slice(&((*i as u64) ^ (1 << 63)).to_be_bytes());
        }
        Value::Float64(f) => {
            buf.push(0x03);
            let bits = f.to_bits();
            let sortable = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
            buf.extend_from_slice(&sortable.to_be_bytes());
        }
        Value::String(s) => {
            buf.push(0x04);
            escape_into(s.as_bytes(), buf);
        }
        Value::Bytes(b) => {
            buf.push(0x05);
            escape_into(b, buf);
        }
    }
}

fn escape_into(bytes: &[u8], buf: &mut Vec<u8>) {
    for &byte in bytes {
        buf.push(byte);
        if byte == 0x00 {
            buf.push(0xFF);
        }
    }
    buf.push(0x00);
    buf.push(0x01);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_key_layout() {
        let key = row_key(7, 42);
        assert_eq!(key[0], ROW_TAG);
        assert!(key.starts_with(&table_prefix(7)));
        assert_eq!(decode_row_id(&key), Some(42));
    }

    #[test]
    fn test_row_keys_sort_by_row_id() {
        assert!(row_key(1, 2) < row_key(1, 10));
        assert!(row_key(1, u64::MAX) < row_key(2, 0));
    }

    #[test]
    fn test_int_encoding_is_ordered() {
        let a = index_key(1, &[&Value::Int64(-5)], 0);
        let b = index_key(1, &[&Value::Int64(0)], 0);
        let c = index_key(1, &[&Value::Int64(9)], 0);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_string_prefix_does_not_match_longer_value() {
        let ab = index_value_prefix(3, &[&Value::from("AB")]);
        let abc = index_key(3, &[&Value::from("ABC")], 1);
        assert!(!abc.starts_with(&ab));
        let exact = index_key(3, &[&Value::from("AB")], 1);
        assert!(exact.starts_with(&ab));
    }

    #[test]
    fn test_index_key_row_id_suffix() {
        let key = index_key(9, &[&Value::Int64(3), &Value::from("x\0y")], 77);
        assert_eq!(decode_row_id(&key), Some(77));
    }

    #[test]
    fn test_decode_short_key() {
        assert!(decode_row_id(&[ROW_TAG, 0, 0]).is_none());
    }
}
