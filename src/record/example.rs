//! Minimal `tf.train.Example` protobuf encoding
//!
//! Only the subset needed for records is supported:
//!
//! ```text
//! Example   { Features features = 1; }
//! Features  { map<string, Feature> feature = 1; }
//! Feature   { oneof { BytesList bytes_list = 1; FloatList float_list = 2; Int64List int64_list = 3; } }
//! BytesList { repeated bytes value = 1; }
//! Int64List { repeated int64 value = 1 [packed]; }
//! ```

use super::Record;
use crate::error::{RecordError, RecordResult};

/// Feature key holding the document identifier
pub const ID_FEATURE: &str = "hash";

/// Feature key holding the token ids
pub const TOKENS_FEATURE: &str = "text";

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn put_tag(out: &mut Vec<u8>, field: u32, wire: u8) {
    put_varint(out, (u64::from(field) << 3) | u64::from(wire));
}

fn put_len_field(out: &mut Vec<u8>, field: u32, payload: &[u8]) {
    put_tag(out, field, WIRE_LEN);
    put_varint(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

fn feature_entry(key: &str, feature: &[u8]) -> Vec<u8> {
    let mut entry = Vec::with_capacity(key.len() + feature.len() + 8);
    put_len_field(&mut entry, 1, key.as_bytes());
    put_len_field(&mut entry, 2, feature);
    entry
}

/// Serialize a record as an Example message
pub fn encode_example(record: &Record) -> Vec<u8> {
    let mut bytes_list = Vec::with_capacity(record.id.len() + 4);
    put_len_field(&mut bytes_list, 1, &record.id);
    let mut id_feature = Vec::with_capacity(bytes_list.len() + 4);
    put_len_field(&mut id_feature, 1, &bytes_list);

    let mut packed = Vec::with_capacity(record.tokens.len() * 2);
    for &token in &record.tokens {
        // int64 on the wire is the two's complement bit pattern
        put_varint(&mut packed, token as u64);
    }
    let mut int64_list = Vec::with_capacity(packed.len() + 8);
    put_len_field(&mut int64_list, 1, &packed);
    let mut tokens_feature = Vec::with_capacity(int64_list.len() + 8);
    put_len_field(&mut tokens_feature, 3, &int64_list);

    let mut features = Vec::new();
    put_len_field(&mut features, 1, &feature_entry(ID_FEATURE, &id_feature));
    put_len_field(&mut features, 1, &feature_entry(TOKENS_FEATURE, &tokens_feature));

    let mut example = Vec::with_capacity(features.len() + 8);
    put_len_field(&mut example, 1, &features);
    example
}

/// Cursor over protobuf fields in a byte slice
struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
}

enum Value<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
    Fixed,
}

impl<'a> Fields<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn varint(&mut self) -> RecordResult<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(RecordError::Truncated { field: "varint" })?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(RecordError::Malformed("varint longer than 10 bytes".into()))
    }

    fn take(&mut self, len: usize, field: &'static str) -> RecordResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(RecordError::Truncated { field })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn next_field(&mut self) -> RecordResult<Option<(u32, Value<'a>)>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let key = self.varint()?;
        let field = (key >> 3) as u32;
        let value = match (key & 0x7) as u8 {
            WIRE_VARINT => Value::Varint(self.varint()?),
            WIRE_LEN => {
                let len = self.varint()? as usize;
                Value::Bytes(self.take(len, "length-delimited field")?)
            }
            WIRE_FIXED64 => {
                self.take(8, "fixed64")?;
                Value::Fixed
            }
            WIRE_FIXED32 => {
                self.take(4, "fixed32")?;
                Value::Fixed
            }
            other => {
                return Err(RecordError::Malformed(format!("unsupported wire type {other}")));
            }
        };
        Ok(Some((field, value)))
    }
}

fn decode_bytes_list(buf: &[u8]) -> RecordResult<Vec<u8>> {
    let mut fields = Fields::new(buf);
    let mut first = None;
    while let Some((field, value)) = fields.next_field()? {
        if let (1, Value::Bytes(bytes)) = (field, value) {
            first.get_or_insert_with(|| bytes.to_vec());
        }
    }
    first.ok_or_else(|| RecordError::Malformed("empty bytes_list".into()))
}

fn decode_int64_list(buf: &[u8]) -> RecordResult<Vec<i64>> {
    let mut fields = Fields::new(buf);
    let mut values = Vec::new();
    while let Some((field, value)) = fields.next_field()? {
        match (field, value) {
            (1, Value::Bytes(packed)) => {
                let mut inner = Fields::new(packed);
                while inner.pos < packed.len() {
                    values.push(inner.varint()? as i64);
                }
            }
            (1, Value::Varint(v)) => values.push(v as i64),
            _ => {}
        }
    }
    Ok(values)
}

/// Parse an Example message back into a record
pub fn decode_example(buf: &[u8]) -> RecordResult<Record> {
    let mut id = None;
    let mut tokens = None;

    let mut example = Fields::new(buf);
    while let Some((field, value)) = example.next_field()? {
        let (1, Value::Bytes(features)) = (field, value) else {
            continue;
        };
        let mut features = Fields::new(features);
        while let Some((field, value)) = features.next_field()? {
            let (1, Value::Bytes(entry)) = (field, value) else {
                continue;
            };

            let mut key = None;
            let mut feature = None;
            let mut entry = Fields::new(entry);
            while let Some((field, value)) = entry.next_field()? {
                match (field, value) {
                    (1, Value::Bytes(k)) => key = Some(k),
                    (2, Value::Bytes(f)) => feature = Some(f),
                    _ => {}
                }
            }
            let (Some(key), Some(feature)) = (key, feature) else {
                continue;
            };

            let mut kinds = Fields::new(feature);
            while let Some((kind, value)) = kinds.next_field()? {
                let Value::Bytes(list) = value else { continue };
                match (key, kind) {
                    (k, 1) if k == ID_FEATURE.as_bytes() => id = Some(decode_bytes_list(list)?),
                    (k, 3) if k == TOKENS_FEATURE.as_bytes() => {
                        tokens = Some(decode_int64_list(list)?)
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(Record {
        id: id.ok_or_else(|| RecordError::Malformed(format!("missing '{ID_FEATURE}' feature")))?,
        tokens: tokens
            .ok_or_else(|| RecordError::Malformed(format!("missing '{TOKENS_FEATURE}' feature")))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_encoding() {
        let mut out = Vec::new();
        put_varint(&mut out, 1);
        put_varint(&mut out, 300);
        assert_eq!(out, vec![0x01, 0xAC, 0x02]);
    }

    #[test]
    fn test_known_encoding() {
        // Hand-assembled from the Example schema for hash="a", text=[1, 2]
        let record = Record {
            id: b"a".to_vec(),
            tokens: vec![1, 2],
        };
        let expected: Vec<u8> = vec![
            0x0A, 0x1F, // features
            0x0A, 0x0D, // entry "hash"
            0x0A, 0x04, b'h', b'a', b's', b'h', //
            0x12, 0x05, 0x0A, 0x03, 0x0A, 0x01, b'a', // bytes_list ["a"]
            0x0A, 0x0E, // entry "text"
            0x0A, 0x04, b't', b'e', b'x', b't', //
            0x12, 0x06, 0x1A, 0x04, 0x0A, 0x02, 0x01, 0x02, // packed int64_list [1, 2]
        ];
        assert_eq!(encode_example(&record), expected);
    }

    #[test]
    fn test_decode_recovers_record() {
        let record = Record::new("0123abcd", &(0..300).collect::<Vec<u32>>());
        let decoded = decode_example(&encode_example(&record)).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_unpacked_int64() {
        // Writers may emit repeated int64 unpacked
        let mut int64_list = Vec::new();
        put_tag(&mut int64_list, 1, WIRE_VARINT);
        put_varint(&mut int64_list, 7);
        put_tag(&mut int64_list, 1, WIRE_VARINT);
        put_varint(&mut int64_list, 9);
        assert_eq!(decode_int64_list(&int64_list).unwrap(), vec![7, 9]);
    }

    #[test]
    fn test_decode_truncated() {
        let encoded = encode_example(&Record::new("x", &[1, 2, 3]));
        let err = decode_example(&encoded[..encoded.len() - 2]).unwrap_err();
        assert!(matches!(err, RecordError::Truncated { .. }));
    }

    #[test]
    fn test_decode_missing_feature() {
        let mut features = Vec::new();
        put_len_field(&mut features, 1, &feature_entry("other", &[]));
        let mut example = Vec::new();
        put_len_field(&mut example, 1, &features);
        assert!(matches!(
            decode_example(&example),
            Err(RecordError::Malformed(_))
        ));
    }
}
