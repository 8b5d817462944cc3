// Delta header: two little-endian base-128 sizes.
//
//   source_size   aggregate end offset of the source set the delta was made against
//   target_size   length of the reconstructed target
//
// Instructions start immediately after the second varint.

use std::io::{self, Write};

use super::varint;
use crate::error::{DeltaError, Result};

/// Smallest well-formed non-empty delta: two one-byte sizes and one opcode.
pub const DELTA_SIZE_MIN: usize = 3;

/// Parsed delta header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaHeader {
    /// Aggregate end offset of the source set.
    pub source_size: usize,
    /// Length of the target the delta reconstructs.
    pub target_size: usize,
}

impl DeltaHeader {
    pub fn new(source_size: usize, target_size: usize) -> Self {
        Self {
            source_size,
            target_size,
        }
    }

    /// Encoded length of this header.
    pub fn encoded_len(&self) -> usize {
        varint::sizeof_usize(self.source_size) + varint::sizeof_usize(self.target_size)
    }

    /// Append the header to a writer.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        varint::write_usize(w, self.source_size)?;
        varint::write_usize(w, self.target_size)
    }

    /// Parse the header from the start of `delta`.
    ///
    /// Returns the header and the number of bytes it occupied.
    pub fn parse(delta: &[u8]) -> Result<(Self, usize)> {
        let (source_size, n1) = varint::read_usize(delta)?;
        let (target_size, n2) = varint::read_usize(&delta[n1..])?;
        Ok((
            Self {
                source_size,
                target_size,
            },
            n1 + n2,
        ))
    }

    /// Parse the header of a delta that is about to be applied.
    ///
    /// Rejects empty buffers with `BufferEmpty` and anything shorter than
    /// [`DELTA_SIZE_MIN`] with `SourceCorrupt`.
    pub fn parse_checked(delta: &[u8]) -> Result<(Self, usize)> {
        if delta.is_empty() {
            return Err(DeltaError::BufferEmpty);
        }
        if delta.len() < DELTA_SIZE_MIN {
            return Err(DeltaError::corrupt(format!(
                "delta of {} bytes is shorter than the {DELTA_SIZE_MIN}-byte minimum",
                delta.len()
            )));
        }
        Self::parse(delta)
    }
}
