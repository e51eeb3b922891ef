//! Envelope reader: walks a capture buffer of length-prefixed documents.
//!
//! Buffer layout:
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ doc_len: i32 LE │ BSON body ...              │  { _id, type: 0, doc: {...} }
//! ├──────────────────────────────────────────────┤
//! │ doc_len: i32 LE │ BSON body ...              │  { _id, type: 1, data: BinData }
//! ├──────────────────────────────────────────────┤
//! │ ...                                          │
//! └──────────────────────────────────────────────┘
//! ```
//! Block boundaries are only known from the preceding document's length, so
//! the walk is strictly sequential.

use tracing::debug;

use crate::bson::{Document, MIN_DOCUMENT_LEN};
use crate::error::{FtdcError, Result};

const TYPE_METADATA: i32 = 0;
const TYPE_METRIC_CHUNK: i32 = 1;

/// One top-level document of a capture file.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// `type = 0`: one-time descriptive header (host info, build info, ...).
    Metadata(Document),
    /// `type = 1`: compressed metric chunk payload.
    Chunk { offset: usize, data: Vec<u8> },
    /// Any other type code. Newer servers write e.g. periodic metadata deltas.
    Unknown { offset: usize, kind: Option<i32> },
}

/// Lazy, fused iterator over the envelope documents of a buffer.
pub struct EnvelopeReader<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> EnvelopeReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::at(buf, 0)
    }

    /// Starts (or restarts) the walk at a known document boundary.
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self {
            buf,
            pos: offset,
            failed: false,
        }
    }

    /// Byte offset of the next document to be read.
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn corrupt(&self, declared_len: usize, reason: impl Into<String>) -> FtdcError {
        FtdcError::CorruptEnvelope {
            offset: self.pos,
            declared_len,
            buffer_len: self.buf.len(),
            reason: reason.into(),
        }
    }

    fn read_next(&mut self) -> Result<Envelope> {
        let rest = &self.buf[self.pos..];
        let declared_len = Document::declared_len(rest)
            .ok_or_else(|| self.corrupt(0, "missing or negative length prefix"))?;
        if declared_len < MIN_DOCUMENT_LEN {
            return Err(self.corrupt(declared_len, "length prefix below document minimum"));
        }
        if declared_len > rest.len() {
            return Err(self.corrupt(declared_len, "length prefix past end of buffer"));
        }

        let doc = Document::from_bytes(&rest[..declared_len])
            .map_err(|e| self.corrupt(declared_len, e.to_string()))?;
        let offset = self.pos;
        self.pos += declared_len;

        let envelope = match doc.get_i32("type") {
            Some(TYPE_METADATA) => match doc.get_document("doc") {
                Some(meta) => Envelope::Metadata(meta.clone()),
                None => Envelope::Metadata(Document::new()),
            },
            Some(TYPE_METRIC_CHUNK) => {
                let data = doc.get_binary("data").ok_or_else(|| FtdcError::CorruptEnvelope {
                    offset,
                    declared_len,
                    buffer_len: self.buf.len(),
                    reason: "metric chunk without binary data field".into(),
                })?;
                Envelope::Chunk {
                    offset,
                    data: data.to_vec(),
                }
            }
            kind => {
                debug!(offset, ?kind, "envelope: ignoring document of unknown type");
                Envelope::Unknown { offset, kind }
            }
        };
        Ok(envelope)
    }
}

impl Iterator for EnvelopeReader<'_> {
    type Item = Result<Envelope>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let item = self.read_next();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bson::Value;
    use crate::testing::{capture, chunk_envelope, encode_document, metadata_envelope};

    fn host_info() -> Document {
        Document::new().with("hostname", Value::String("db01".into()))
    }

    #[test]
    fn test_classifies_metadata_and_chunks() {
        let buf = capture(&[
            metadata_envelope(host_info()),
            chunk_envelope(vec![1, 2, 3, 4, 5]),
            chunk_envelope(vec![6, 7]),
        ]);

        let envelopes: Vec<Envelope> = EnvelopeReader::new(&buf).map(|e| e.unwrap()).collect();
        assert_eq!(envelopes.len(), 3);
        assert_eq!(envelopes[0], Envelope::Metadata(host_info()));
        match &envelopes[1] {
            Envelope::Chunk { data, .. } => assert_eq!(data, &vec![1, 2, 3, 4, 5]),
            other => panic!("expected chunk, got {:?}", other),
        }
        match &envelopes[2] {
            Envelope::Chunk { data, .. } => assert_eq!(data, &vec![6, 7]),
            other => panic!("expected chunk, got {:?}", other),
        }
    }

    #[test]
    fn test_restart_from_offset() {
        let first = encode_document(&metadata_envelope(host_info()));
        let buf = capture(&[metadata_envelope(host_info()), chunk_envelope(vec![9])]);

        let mut reader = EnvelopeReader::at(&buf, first.len());
        assert_eq!(reader.offset(), first.len());
        match reader.next().unwrap().unwrap() {
            Envelope::Chunk { offset, data } => {
                assert_eq!(offset, first.len());
                assert_eq!(data, vec![9]);
            }
            other => panic!("expected chunk, got {:?}", other),
        }
        assert!(reader.next().is_none());
        assert_eq!(reader.offset(), buf.len());
    }

    #[test]
    fn test_length_past_end_is_corrupt() {
        let mut buf = capture(&[chunk_envelope(vec![1, 2, 3])]);
        let good_len = buf.len();
        // Second document claims 4 KiB but only 8 bytes follow.
        buf.extend_from_slice(&4096i32.to_le_bytes());
        buf.extend_from_slice(&[0, 0, 0, 0]);

        let mut reader = EnvelopeReader::new(&buf);
        assert!(reader.next().unwrap().is_ok());
        match reader.next().unwrap() {
            Err(FtdcError::CorruptEnvelope {
                offset,
                declared_len,
                ..
            }) => {
                assert_eq!(offset, good_len);
                assert_eq!(declared_len, 4096);
            }
            other => panic!("expected CorruptEnvelope, got {:?}", other),
        }
        // Fused after the first hard error.
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_short_trailing_prefix_is_corrupt() {
        let mut buf = capture(&[metadata_envelope(host_info())]);
        buf.extend_from_slice(&[0x10, 0x00]);
        let results: Vec<_> = EnvelopeReader::new(&buf).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(FtdcError::CorruptEnvelope { .. })));
    }

    #[test]
    fn test_unknown_type_is_surfaced() {
        let doc = Document::new().with("type", Value::Int32(2));
        let buf = capture(&[doc]);
        let envelopes: Vec<Envelope> = EnvelopeReader::new(&buf).map(|e| e.unwrap()).collect();
        assert_eq!(
            envelopes,
            vec![Envelope::Unknown {
                offset: 0,
                kind: Some(2)
            }]
        );
    }

    #[test]
    fn test_empty_buffer_yields_nothing() {
        assert!(EnvelopeReader::new(&[]).next().is_none());
    }
}
