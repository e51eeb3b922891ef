//! Delta stream decoding: varints with zero-run compression, column-major.
//!
//! For every attribute, in schema order, the stream holds `num_deltas`
//! deltas. A delta of `0` is followed by a second varint giving the number of
//! *additional* zero deltas, so `[0, 0, 0]` may be written either as three
//! `0, 0` pairs or as a single `0, 2`.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{FtdcError, Result};
use crate::flatten::{Schema, SkippedLeaf};
use crate::model::ReplSetStatus;

/// A u64 LEB128 needs at most 10 bytes.
const MAX_VARINT_LEN: usize = 10;

/// Reads unsigned LEB128 varints from a byte slice.
pub struct VarintReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> VarintReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reads one varint. `Err` carries a description of what went wrong.
    pub fn read(&mut self) -> std::result::Result<u64, String> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(format!("delta stream ended inside varint at byte {}", self.pos));
            };
            self.pos += 1;
            let payload = u64::from(byte & 0x7f);
            if i == MAX_VARINT_LEN - 1 && payload > 1 {
                return Err(format!("varint overflows u64 at byte {}", self.pos - 1));
            }
            value |= payload << (7 * i);
            if byte < 0x80 {
                return Ok(value);
            }
        }
        Err(format!("varint longer than {} bytes at byte {}", MAX_VARINT_LEN, self.pos))
    }
}

/// Decodes one attribute column, starting from its reference value.
///
/// The zero-run counter lives in this function, so it is reset at every
/// attribute boundary. A run longer than the column is cut at the column end.
fn decode_column(
    reader: &mut VarintReader<'_>,
    reference: u64,
    num_deltas: usize,
    series: &mut Vec<u64>,
) -> std::result::Result<(), String> {
    let mut value = reference;
    let mut zeros_left: u64 = 0;
    series.push(value);
    for _ in 0..num_deltas {
        let delta = if zeros_left > 0 {
            zeros_left -= 1;
            0
        } else {
            let delta = reader.read()?;
            if delta == 0 {
                zeros_left = reader.read()?;
            }
            delta
        };
        value = value.wrapping_add(delta);
        series.push(value);
    }
    if zeros_left > 0 {
        debug!(zeros_left, "delta: zero run past the end of its column dropped");
    }
    Ok(())
}

/// Rebuilds the full series of every attribute.
///
/// Returns one series of length `num_deltas + 1` per schema path, in schema
/// order. `offset` is the envelope offset used in error reports.
pub fn decode_deltas(
    schema: &Schema,
    num_attribs: u32,
    num_deltas: u32,
    stream: &[u8],
    offset: usize,
) -> Result<Vec<Vec<u64>>> {
    if schema.len() != num_attribs as usize {
        return Err(FtdcError::InconsistentSchema {
            offset,
            declared: num_attribs,
            discovered: schema.len(),
        });
    }

    let num_deltas = num_deltas as usize;
    let mut reader = VarintReader::new(stream);
    let mut series = Vec::with_capacity(schema.len());
    for (path, &reference) in schema.paths.iter().zip(&schema.values) {
        let mut column = Vec::with_capacity(num_deltas + 1);
        decode_column(&mut reader, reference, num_deltas, &mut column).map_err(|reason| {
            FtdcError::TruncatedBlock {
                offset,
                reason: format!("{}: {}", path, reason),
            }
        })?;
        series.push(column);
    }
    Ok(series)
}

/// Fully decoded metric block: one series per attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBlock {
    /// Envelope offset of the chunk this block came from.
    pub offset: usize,
    /// Attribute paths in column order.
    pub paths: Vec<String>,
    /// `series[k][i]` is the value of `paths[k]` at sample `i`.
    pub series: Vec<Vec<u64>>,
    pub num_deltas: u32,
    /// Non-numeric leaves of the reference document.
    pub skipped: Vec<SkippedLeaf>,
    /// Replica-set status read from the reference document.
    pub repl_set: Option<ReplSetStatus>,
}

impl DecodedBlock {
    /// Decodes the delta stream of a block whose reference was flattened
    /// into `schema`.
    pub fn decode(
        schema: Schema,
        num_attribs: u32,
        num_deltas: u32,
        stream: &[u8],
        offset: usize,
    ) -> Result<Self> {
        let series = decode_deltas(&schema, num_attribs, num_deltas, stream, offset)?;
        Ok(Self {
            offset,
            paths: schema.paths,
            series,
            num_deltas,
            skipped: schema.skipped,
            repl_set: None,
        })
    }

    /// Samples per attribute: the reference plus one per delta.
    pub fn sample_count(&self) -> usize {
        self.num_deltas as usize + 1
    }

    pub fn num_attribs(&self) -> usize {
        self.paths.len()
    }

    /// Series of a path, if the reference document had it.
    pub fn series_for(&self, path: &str) -> Option<&[u64]> {
        self.paths
            .iter()
            .position(|p| p == path)
            .map(|k| self.series[k].as_slice())
    }

    pub fn value(&self, path: &str, sample: usize) -> Option<u64> {
        self.series_for(path).and_then(|s| s.get(sample).copied())
    }

    /// Path → column index, for repeated lookups.
    pub fn index(&self) -> HashMap<&str, usize> {
        self.paths
            .iter()
            .enumerate()
            .map(|(k, p)| (p.as_str(), k))
            .collect()
    }
}
