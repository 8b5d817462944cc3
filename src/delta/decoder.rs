// Delta applier: header check, then sequential execution of insert and
// copy opcodes against a single buffer or an aggregate of several.
//
// Delta bytes are untrusted.  Every operand is bounds-checked before it is
// used and the output never grows past the declared target size.

use log::debug;

use super::header::DeltaHeader;
use super::opcode::{Instruction, decode_instruction};
use crate::error::{DeltaError, Result};
use crate::hash::config::MAX_COPY_SIZE;
use crate::hash::index::SourceInfo;

/// Cap on the up-front reservation for the reconstructed target.  A hostile
/// header can claim any size; larger targets grow on demand.
const MAX_PREALLOC: usize = 1 << 26;

/// Bytes to reserve before decoding: the declared target size, bounded by
/// what `opcode_bytes` of instructions could produce at most (one byte per
/// full-length copy).
fn initial_capacity(target_size: usize, opcode_bytes: usize) -> usize {
    target_size
        .min(opcode_bytes.saturating_mul(MAX_COPY_SIZE))
        .min(MAX_PREALLOC)
}

// ---------------------------------------------------------------------------
// Copy sources
// ---------------------------------------------------------------------------

/// Resolves copy instructions against aggregate source offsets.
pub trait CopySource {
    /// Aggregate end offset; must equal the delta header's source size.
    fn aggregate_size(&self) -> usize;

    /// Append `len` bytes starting at aggregate `offset` to `out`.
    ///
    /// Spans that leave the addressable bytes are `SourceCorrupt`.
    fn copy_into(&self, offset: usize, len: usize, out: &mut Vec<u8>) -> Result<()>;
}

impl CopySource for [u8] {
    fn aggregate_size(&self) -> usize {
        self.len()
    }

    fn copy_into(&self, offset: usize, len: usize, out: &mut Vec<u8>) -> Result<()> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.len())
            .ok_or_else(|| out_of_bounds(offset, len, self.len()))?;
        out.try_reserve(len)?;
        out.extend_from_slice(&self[offset..end]);
        Ok(())
    }
}

/// Several source buffers addressed as one, in increasing aggregate order.
///
/// Gaps between sources are part of the address space but hold no bytes.
#[derive(Debug, Clone, Copy)]
pub struct AggregateSource<'s, 'a> {
    sources: &'s [SourceInfo<'a>],
}

impl<'s, 'a> AggregateSource<'s, 'a> {
    /// Wrap `sources`, rejecting overlapping or out-of-order placement.
    pub fn new(sources: &'s [SourceInfo<'a>]) -> Result<Self> {
        let mut end = 0usize;
        for (i, src) in sources.iter().enumerate() {
            if src.agg_offset < end {
                return Err(DeltaError::corrupt(format!(
                    "source {i} at aggregate offset {} overlaps the previous source ending at {end}",
                    src.agg_offset
                )));
            }
            end = src.end();
        }
        Ok(Self { sources })
    }

    /// Source holding aggregate byte `offset`, if any.
    fn locate(&self, offset: usize) -> Option<&SourceInfo<'a>> {
        let idx = self.sources.partition_point(|s| s.end() <= offset);
        self.sources
            .get(idx)
            .filter(|s| s.agg_offset <= offset && offset < s.end())
    }
}

impl CopySource for AggregateSource<'_, '_> {
    fn aggregate_size(&self) -> usize {
        self.sources.last().map_or(0, SourceInfo::end)
    }

    fn copy_into(&self, offset: usize, len: usize, out: &mut Vec<u8>) -> Result<()> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.aggregate_size())
            .ok_or_else(|| out_of_bounds(offset, len, self.aggregate_size()))?;
        out.try_reserve(len)?;

        let mut pos = offset;
        while pos < end {
            let src = self.locate(pos).ok_or_else(|| {
                DeltaError::corrupt(format!(
                    "copy at {offset}+{len} touches unpopulated aggregate byte {pos}"
                ))
            })?;
            let local = pos - src.agg_offset;
            let take = (src.end() - pos).min(end - pos);
            out.extend_from_slice(&src.buf[local..local + take]);
            pos += take;
        }
        Ok(())
    }
}

fn out_of_bounds(offset: usize, len: usize, size: usize) -> DeltaError {
    DeltaError::corrupt(format!(
        "copy of {len} bytes at offset {offset} exceeds source size {size}"
    ))
}

// ---------------------------------------------------------------------------
// Instruction iteration
// ---------------------------------------------------------------------------

/// Walks the opcodes of a delta without applying them.
///
/// Yields `Err` once and then stops if the stream is malformed.
pub struct InstructionIter<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> InstructionIter<'a> {
    /// Parse the header of `delta` and position the iterator on the first opcode.
    pub fn new(delta: &'a [u8]) -> Result<(DeltaHeader, Self)> {
        let (header, pos) = DeltaHeader::parse(delta)?;
        Ok((
            header,
            Self {
                data: delta,
                pos,
                failed: false,
            },
        ))
    }

    /// Byte offset of the next opcode.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for InstructionIter<'a> {
    type Item = Result<Instruction<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let data = self.data;
        match decode_instruction(&data[self.pos..]) {
            Ok((ins, used)) => {
                self.pos += used;
                Some(Ok(ins))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Reconstruct a target from `delta` and any [`CopySource`].
pub fn apply_with<S: CopySource + ?Sized>(source: &S, delta: &[u8]) -> Result<Vec<u8>> {
    let (header, start) = DeltaHeader::parse_checked(delta)?;
    if header.source_size != source.aggregate_size() {
        return Err(DeltaError::corrupt(format!(
            "delta expects {} source bytes, got {}",
            header.source_size,
            source.aggregate_size()
        )));
    }

    let target_size = header.target_size;
    let mut out = Vec::new();
    out.try_reserve(initial_capacity(target_size, delta.len() - start))?;

    let mut pos = start;
    while pos < delta.len() {
        let (ins, used) = decode_instruction(&delta[pos..])?;
        pos += used;

        if ins.target_len() > target_size - out.len() {
            return Err(DeltaError::TooLarge { limit: target_size });
        }
        match ins {
            Instruction::Insert(data) => {
                out.try_reserve(data.len())?;
                out.extend_from_slice(data);
            }
            Instruction::Copy { offset, len } => source.copy_into(offset, len, &mut out)?,
        }
    }

    if out.len() != target_size {
        return Err(DeltaError::corrupt(format!(
            "delta produced {} bytes, header declared {target_size}",
            out.len()
        )));
    }
    Ok(out)
}

/// Reconstruct a target from a delta made against one contiguous source.
pub fn apply_delta(source: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    apply_with(source, delta)
}

/// Reconstruct a target from a delta made against several sources laid out
/// in one aggregate address space.
pub fn apply_delta_sources(sources: &[SourceInfo<'_>], delta: &[u8]) -> Result<Vec<u8>> {
    let aggregate = AggregateSource::new(sources)?;
    let out = apply_with(&aggregate, delta)?;
    debug!(
        "applied {}-byte delta against {} sources: {} bytes out",
        delta.len(),
        sources.len(),
        out.len()
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Opcode and byte totals of one delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaStats {
    pub header: DeltaHeader,
    pub copy_ops: usize,
    pub insert_ops: usize,
    pub copied_bytes: usize,
    pub inserted_bytes: usize,
    pub delta_size: usize,
}

impl DeltaStats {
    /// Walk `delta` and total its opcodes.
    pub fn from_delta(delta: &[u8]) -> Result<Self> {
        let (header, iter) = InstructionIter::new(delta)?;
        let mut stats = Self {
            header,
            delta_size: delta.len(),
            ..Self::default()
        };
        for ins in iter {
            match ins? {
                Instruction::Copy { len, .. } => {
                    stats.copy_ops += 1;
                    stats.copied_bytes += len;
                }
                Instruction::Insert(data) => {
                    stats.insert_ops += 1;
                    stats.inserted_bytes += data.len();
                }
            }
        }
        Ok(stats)
    }

    /// Target bytes described by the opcodes.
    pub fn target_bytes(&self) -> usize {
        self.copied_bytes + self.inserted_bytes
    }

    /// Delta size over target size; 0.0 for an empty target.
    pub fn ratio(&self) -> f64 {
        if self.header.target_size == 0 {
            0.0
        } else {
            self.delta_size as f64 / self.header.target_size as f64
        }
    }
}
