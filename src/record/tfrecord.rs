//! TFRecord container framing
//!
//! Each frame is laid out as:
//!
//! ```text
//! u64 LE  length
//! u32 LE  masked crc32c(length bytes)
//! [u8]    data (length bytes)
//! u32 LE  masked crc32c(data)
//! ```

use super::example::{decode_example, encode_example};
use super::{Record, RecordSink};
use crate::error::{RecordError, RecordResult};
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::Path;

const MASK_DELTA: u32 = 0xa282_ead8;

/// CRC32C with the rotation and offset TFRecord applies
pub fn masked_crc(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Writes Example records into a TFRecord stream
pub struct TfRecordWriter<W: Write> {
    inner: W,
    records: u64,
    bytes: u64,
}

impl<W: Write> TfRecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            records: 0,
            bytes: 0,
        }
    }

    /// Write one raw frame
    pub fn write_frame(&mut self, data: &[u8]) -> io::Result<()> {
        let len = (data.len() as u64).to_le_bytes();
        self.inner.write_all(&len)?;
        self.inner.write_all(&masked_crc(&len).to_le_bytes())?;
        self.inner.write_all(data)?;
        self.inner.write_all(&masked_crc(data).to_le_bytes())?;

        self.records += 1;
        self.bytes += data.len() as u64 + 16;
        Ok(())
    }

    /// Bytes written including framing
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Flush and hand back the underlying writer
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> RecordSink for TfRecordWriter<W> {
    fn write_record(&mut self, record: &Record) -> io::Result<()> {
        self.write_frame(&encode_example(record))
    }

    fn records_written(&self) -> u64 {
        self.records
    }
}

/// Iterates frames of a TFRecord stream, verifying checksums
pub struct TfRecordReader<R: Read> {
    inner: R,
    done: bool,
}

impl<R: Read> TfRecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    fn read_exact_field(&mut self, buf: &mut [u8], field: &'static str) -> RecordResult<()> {
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => RecordError::Truncated { field },
            _ => RecordError::Io(e),
        })
    }

    /// Read the length header; `None` on clean end of stream
    fn read_len(&mut self) -> RecordResult<Option<[u8; 8]>> {
        let mut len = [0u8; 8];
        let mut filled = 0;
        while filled < len.len() {
            match self.inner.read(&mut len[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(RecordError::Truncated { field: "length" }),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(RecordError::Io(e)),
            }
        }
        Ok(Some(len))
    }

    fn read_frame(&mut self) -> RecordResult<Option<Vec<u8>>> {
        let Some(len_bytes) = self.read_len()? else {
            return Ok(None);
        };

        let mut crc = [0u8; 4];
        self.read_exact_field(&mut crc, "length checksum")?;
        verify("length", &len_bytes, u32::from_le_bytes(crc))?;

        let len = u64::from_le_bytes(len_bytes) as usize;
        let mut data = vec![0u8; len];
        self.read_exact_field(&mut data, "data")?;

        self.read_exact_field(&mut crc, "data checksum")?;
        verify("data", &data, u32::from_le_bytes(crc))?;

        Ok(Some(data))
    }
}

fn verify(field: &'static str, bytes: &[u8], found: u32) -> RecordResult<()> {
    let expected = masked_crc(bytes);
    if expected != found {
        return Err(RecordError::Checksum {
            field,
            expected,
            found,
        });
    }
    Ok(())
}

impl<R: Read> Iterator for TfRecordReader<R> {
    type Item = RecordResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read and decode every record of an artifact file
pub fn read_artifact(path: &Path) -> RecordResult<Vec<Record>> {
    let reader = TfRecordReader::new(BufReader::new(File::open(path)?));
    reader
        .map(|frame| frame.and_then(|data| decode_example(&data)))
        .collect()
}
