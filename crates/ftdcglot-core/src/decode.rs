//! Buffer pipeline: envelope → chunk → flatten → delta decode.
//!
//! `decode_buffer` is a pure function of its input bytes. Blocks come out in
//! file order, which later stages rely on for restart detection.

use tracing::{debug, warn};

use crate::bson::Document;
use crate::chunk::{MetricBlock, inflate};
use crate::delta::DecodedBlock;
use crate::envelope::{Envelope, EnvelopeReader};
use crate::error::{FtdcError, Result};
use crate::flatten::flatten;
use crate::model::ReplSetStatus;

/// What to do with a block that fails to inflate or decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockErrorPolicy {
    /// Record the block as discarded and continue with the next one.
    #[default]
    SkipBlock,
    /// Return the first block error to the caller.
    Abort,
}

/// Decoder configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeOptions {
    pub on_block_error: BlockErrorPolicy,
}

impl DecodeOptions {
    pub fn strict() -> Self {
        Self {
            on_block_error: BlockErrorPolicy::Abort,
        }
    }
}

/// A block dropped under [`BlockErrorPolicy::SkipBlock`].
#[derive(Debug)]
pub struct DiscardedBlock {
    /// Position of the chunk among the buffer's chunk documents.
    pub index: usize,
    pub error: FtdcError,
}

/// Everything decoded from one capture buffer.
#[derive(Debug, Default)]
pub struct DecodedCapture {
    /// The `type = 0` descriptive header, if the buffer had one.
    pub metadata: Option<Document>,
    pub blocks: Vec<DecodedBlock>,
    pub discarded: Vec<DiscardedBlock>,
}

impl DecodedCapture {
    /// Total structured samples across all blocks.
    pub fn sample_count(&self) -> usize {
        self.blocks.iter().map(DecodedBlock::sample_count).sum()
    }
}

/// Inflates and decodes one metric chunk payload.
pub fn decode_block(payload: &[u8], offset: usize) -> Result<DecodedBlock> {
    let bytes = inflate(payload, offset)?;
    let block = MetricBlock::parse(&bytes, offset)?;
    let schema = flatten(&block.reference);
    if !schema.skipped.is_empty() {
        debug!(
            offset,
            skipped = schema.skipped.len(),
            "flatten: non-numeric leaves left out of the series"
        );
    }
    let mut decoded = DecodedBlock::decode(
        schema,
        block.num_attribs,
        block.num_deltas,
        block.deltas,
        offset,
    )?;
    decoded.repl_set = ReplSetStatus::from_reference(&block.reference);
    Ok(decoded)
}

/// Decodes a whole capture buffer.
///
/// A `CorruptEnvelope` always aborts: without a trustworthy length prefix the
/// next document boundary is unknown. Block-local errors follow
/// `opts.on_block_error`.
pub fn decode_buffer(buf: &[u8], opts: &DecodeOptions) -> Result<DecodedCapture> {
    let mut capture = DecodedCapture::default();
    let mut chunk_index = 0usize;

    for envelope in EnvelopeReader::new(buf) {
        match envelope? {
            Envelope::Metadata(doc) => {
                if capture.metadata.is_none() {
                    capture.metadata = Some(doc);
                } else {
                    debug!("envelope: extra metadata document ignored");
                }
            }
            Envelope::Chunk { offset, data } => {
                let index = chunk_index;
                chunk_index += 1;
                match decode_block(&data, offset) {
                    Ok(block) => capture.blocks.push(block),
                    Err(e) if opts.on_block_error == BlockErrorPolicy::SkipBlock => {
                        warn!(index, offset, error = %e, "chunk: block discarded");
                        capture.discarded.push(DiscardedBlock { index, error: e });
                    }
                    Err(e) => return Err(e),
                }
            }
            Envelope::Unknown { .. } => {}
        }
    }
    Ok(capture)
}
