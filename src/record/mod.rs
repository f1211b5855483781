//! Record serialization
//!
//! Each surviving document becomes one [`Record`]: its identifier plus its
//! token ids. Records are written through a [`RecordSink`]; the shipped sink
//! is a TFRecord container of `tf.train.Example` messages with two features:
//!
//! ```text
//! hash: bytes_list  [identifier]
//! text: int64_list  [token ids...]
//! ```

pub mod example;
pub mod tfrecord;

pub use example::{decode_example, encode_example};
pub use tfrecord::{read_artifact, TfRecordReader, TfRecordWriter};

use std::io;

/// File extension of output artifacts
pub const ARTIFACT_EXTENSION: &str = "tfrecords";

/// One encoded document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Document identifier (filename stem)
    pub id: Vec<u8>,

    /// Token ids
    pub tokens: Vec<i64>,
}

impl Record {
    /// Build a record from an identifier and encoder output
    pub fn new(id: &str, token_ids: &[u32]) -> Self {
        Self {
            id: id.as_bytes().to_vec(),
            tokens: token_ids.iter().map(|&t| i64::from(t)).collect(),
        }
    }

    /// Identifier as text (lossy)
    pub fn id_str(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }
}

/// Destination for records
pub trait RecordSink {
    /// Append one record
    fn write_record(&mut self, record: &Record) -> io::Result<()>;

    /// Records appended so far
    fn records_written(&self) -> u64;
}

impl RecordSink for Vec<Record> {
    fn write_record(&mut self, record: &Record) -> io::Result<()> {
        self.push(record.clone());
        Ok(())
    }

    fn records_written(&self) -> u64 {
        self.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_new_widens_ids() {
        let record = Record::new("abc123", &[0, 50256, u32::MAX]);
        assert_eq!(record.id, b"abc123".to_vec());
        assert_eq!(record.tokens, vec![0, 50256, u32::MAX as i64]);
        assert_eq!(record.id_str(), "abc123");
    }
}
