//! Metric chunk decompression and block header parsing.
//!
//! Chunk payload and inflated block layout:
//! ```text
//! payload:  uncompressed_len: u32 LE │ zlib stream ...
//!
//! block:    ┌────────────────────────────────────────────┐
//!           │ reference document (BSON, sample #0)       │
//!           ├────────────────────────────────────────────┤
//!           │ num_attribs: u32 LE                        │
//!           │ num_deltas:  u32 LE                        │
//!           ├────────────────────────────────────────────┤
//!           │ delta stream: num_attribs columns of       │
//!           │ num_deltas varints each (zero-run packed)  │
//!           └────────────────────────────────────────────┘
//! ```

use flate2::{Decompress, FlushDecompress, Status};

use crate::bson::Document;
use crate::error::{FtdcError, Result};

/// Size of the uncompressed-length prefix in front of the zlib stream.
const PAYLOAD_PREFIX_SIZE: usize = 4;
/// num_attribs + num_deltas.
const BLOCK_COUNTS_SIZE: usize = 8;
/// Bounds for the up-front output allocation; the length prefix is not trusted.
const MIN_OUTPUT_RESERVE: usize = 4 * 1024;
const MAX_OUTPUT_RESERVE: usize = 64 * 1024 * 1024;

/// Inflates a chunk payload. All-or-nothing: a stream that ends before its
/// zlib trailer is an error, never a short block.
pub fn inflate(payload: &[u8], offset: usize) -> Result<Vec<u8>> {
    let fail = |reason: String| FtdcError::DecompressionError { offset, reason };

    if payload.len() < PAYLOAD_PREFIX_SIZE {
        return Err(fail(format!(
            "payload is {} bytes, shorter than its length prefix",
            payload.len()
        )));
    }
    let expected = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let input = &payload[PAYLOAD_PREFIX_SIZE..];

    let mut inflater = Decompress::new(true);
    let mut block = Vec::with_capacity(expected.clamp(MIN_OUTPUT_RESERVE, MAX_OUTPUT_RESERVE));
    loop {
        if block.len() == block.capacity() {
            block.reserve(block.capacity().max(MIN_OUTPUT_RESERVE));
        }
        let (in_before, out_before) = (inflater.total_in(), inflater.total_out());
        let consumed = in_before as usize;
        let status = inflater
            .decompress_vec(&input[consumed..], &mut block, FlushDecompress::None)
            .map_err(|e| fail(e.to_string()))?;
        if status == Status::StreamEnd {
            break;
        }
        let progressed = inflater.total_in() != in_before || inflater.total_out() != out_before;
        let input_done = inflater.total_in() as usize == input.len();
        if block.len() < block.capacity() && (input_done || !progressed) {
            return Err(fail(format!(
                "zlib stream ended early after {} of {} bytes",
                block.len(),
                expected
            )));
        }
    }
    Ok(block)
}

/// One inflated metric block, split into its parts.
pub struct MetricBlock<'a> {
    /// Envelope offset of the chunk this block came from.
    pub offset: usize,
    pub reference: Document,
    /// Byte length of the reference document.
    pub doc_size: usize,
    pub num_attribs: u32,
    pub num_deltas: u32,
    /// Delta stream bytes following the header counts.
    pub deltas: &'a [u8],
}

impl<'a> MetricBlock<'a> {
    pub fn parse(block: &'a [u8], offset: usize) -> Result<Self> {
        let truncated = |reason: String| FtdcError::TruncatedBlock { offset, reason };

        let doc_size = Document::declared_len(block)
            .ok_or_else(|| truncated("block too short for reference document".into()))?;
        let counts_end = doc_size
            .checked_add(BLOCK_COUNTS_SIZE)
            .filter(|&end| end <= block.len())
            .ok_or_else(|| {
                truncated(format!(
                    "reference document of {} bytes leaves no room for block header in {} bytes",
                    doc_size,
                    block.len()
                ))
            })?;

        let reference = Document::from_bytes(&block[..doc_size])
            .map_err(|e| truncated(format!("reference document: {}", e)))?;

        let num_attribs = u32::from_le_bytes(
            block[doc_size..doc_size + 4]
                .try_into()
                .map_err(|_| truncated("num_attribs".into()))?,
        );
        let num_deltas = u32::from_le_bytes(
            block[doc_size + 4..counts_end]
                .try_into()
                .map_err(|_| truncated("num_deltas".into()))?,
        );

        Ok(Self {
            offset,
            reference,
            doc_size,
            num_attribs,
            num_deltas,
            deltas: &block[counts_end..],
        })
    }
}
