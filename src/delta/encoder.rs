// Delta writer: header plus insert/copy opcodes, with an optional hard cap
// on the encoded size.
//
// The match finder decides *what* to emit; this module only lays the bytes
// down.  Long literal runs are split at 127 bytes and long copies at 0x10000.

use log::trace;

use super::header::DeltaHeader;
use super::opcode::{self, MAX_COPY_OP, MAX_OP_SIZE};
use crate::error::{DeltaError, Result};
use crate::hash::config::{MAX_COPY_SIZE, MAX_INSERT_SIZE};

/// Initial output capacity when no size limit is given.
const DEFAULT_CAPACITY: usize = 8192;

/// Upper bound on the up-front reservation for size-limited deltas.
const MAX_INITIAL_CAPACITY: usize = 1 << 20;

/// Accumulates one delta.
pub struct DeltaWriter {
    out: Vec<u8>,
    /// Zero means unlimited.
    max_size: usize,
    target_written: usize,
}

impl DeltaWriter {
    /// Start a delta with the given header and size cap (0 = unlimited).
    pub fn new(header: DeltaHeader, max_size: usize) -> Result<Self> {
        let capacity = if max_size == 0 {
            DEFAULT_CAPACITY
        } else {
            max_size.saturating_add(MAX_OP_SIZE + 1).min(MAX_INITIAL_CAPACITY)
        };
        let mut out = Vec::new();
        out.try_reserve(capacity)?;
        header
            .write(&mut out)
            .map_err(|e| DeltaError::corrupt(format!("header write failed: {e}")))?;

        let writer = Self {
            out,
            max_size,
            target_written: 0,
        };
        writer.check_size()?;
        Ok(writer)
    }

    /// Bytes encoded so far, header included.  Never zero.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.out.len()
    }

    /// Target bytes described so far.
    #[inline]
    pub fn target_written(&self) -> usize {
        self.target_written
    }

    /// Append literal bytes, split into as many insert opcodes as needed.
    pub fn insert(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = data.len().min(MAX_INSERT_SIZE);
            self.out.try_reserve(n + 1)?;
            self.out.push(opcode::insert_opcode(n));
            self.out.extend_from_slice(&data[..n]);
            self.target_written += n;
            data = &data[n..];
            self.check_size()?;
        }
        Ok(())
    }

    /// Append a copy of `len` bytes from aggregate offset `offset`, split into
    /// as many copy opcodes as needed.
    pub fn copy(&mut self, mut offset: usize, mut len: usize) -> Result<()> {
        while len > 0 {
            let n = len.min(MAX_COPY_SIZE);
            let wire_offset = u32::try_from(offset).map_err(|_| DeltaError::TooLarge {
                limit: u32::MAX as usize,
            })?;
            let mut buf = [0u8; MAX_COPY_OP];
            let used = opcode::encode_copy(wire_offset, n, &mut buf);
            self.out.try_reserve(used)?;
            self.out.extend_from_slice(&buf[..used]);
            self.target_written += n;
            offset += n;
            len -= n;
            self.check_size()?;
        }
        Ok(())
    }

    /// Finish and return the encoded delta.
    pub fn finish(self) -> Vec<u8> {
        trace!(
            "delta finished: {} bytes describing {} target bytes",
            self.out.len(),
            self.target_written
        );
        self.out
    }

    fn check_size(&self) -> Result<()> {
        if self.max_size != 0 && self.out.len() > self.max_size {
            return Err(DeltaError::TooLarge {
                limit: self.max_size,
            });
        }
        Ok(())
    }
}
