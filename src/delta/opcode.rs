// Instruction opcodes.
//
//   0x00            reserved, never valid
//   0x01..=0x7F     insert: the opcode is the literal count, literals follow
//   0x80 | flags    copy: up to four offset bytes then up to three length
//                   bytes, least-significant first, only the bytes whose
//                   flag bit is set are present (absent bytes are zero)
//
// A copy length of zero on the wire means 0x10000.

use bitflags::bitflags;

use crate::error::{DeltaError, Result};
use crate::hash::config::{MAX_COPY_SIZE, MAX_INSERT_SIZE};

/// Maximum encoded size of one copy instruction (opcode + 4 + 3).
pub const MAX_COPY_OP: usize = 8;

/// Maximum encoded size of any single instruction.
pub const MAX_OP_SIZE: usize = 1 + MAX_INSERT_SIZE;

bitflags! {
    /// Operand-presence bits of a copy opcode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CopyFlags: u8 {
        const OFFSET_0 = 0x01;
        const OFFSET_1 = 0x02;
        const OFFSET_2 = 0x04;
        const OFFSET_3 = 0x08;
        const LEN_0 = 0x10;
        const LEN_1 = 0x20;
        const LEN_2 = 0x40;
        const COPY = 0x80;
    }
}

const OFFSET_BITS: [CopyFlags; 4] = [
    CopyFlags::OFFSET_0,
    CopyFlags::OFFSET_1,
    CopyFlags::OFFSET_2,
    CopyFlags::OFFSET_3,
];
const LEN_BITS: [CopyFlags; 3] = [CopyFlags::LEN_0, CopyFlags::LEN_1, CopyFlags::LEN_2];

/// One decoded delta instruction, borrowing literals from the delta buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction<'a> {
    /// Copy `len` bytes from aggregate source offset `offset`.
    Copy { offset: usize, len: usize },
    /// Append these literal bytes.
    Insert(&'a [u8]),
}

impl Instruction<'_> {
    /// Number of target bytes this instruction produces.
    #[inline]
    pub fn target_len(&self) -> usize {
        match self {
            Instruction::Copy { len, .. } => *len,
            Instruction::Insert(data) => data.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a copy of `len` bytes (1..=0x10000) at `offset` into `buf`.
///
/// Returns the number of bytes written.  A length of exactly 0x10000 is
/// written with no length bytes.
pub fn encode_copy(offset: u32, len: usize, buf: &mut [u8; MAX_COPY_OP]) -> usize {
    debug_assert!(len > 0 && len <= MAX_COPY_SIZE);
    let mut flags = CopyFlags::COPY;
    let mut n = 1;

    for (i, bit) in OFFSET_BITS.iter().enumerate() {
        let byte = (offset >> (8 * i)) as u8;
        if byte != 0 {
            buf[n] = byte;
            n += 1;
            flags |= *bit;
        }
    }

    let wire_len = if len == MAX_COPY_SIZE { 0 } else { len };
    for (i, bit) in LEN_BITS.iter().enumerate() {
        let byte = (wire_len >> (8 * i)) as u8;
        if byte != 0 {
            buf[n] = byte;
            n += 1;
            flags |= *bit;
        }
    }

    buf[0] = flags.bits();
    n
}

/// Insert opcode for `len` literals (1..=127).
#[inline]
pub fn insert_opcode(len: usize) -> u8 {
    debug_assert!(len > 0 && len <= MAX_INSERT_SIZE);
    len as u8
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode the instruction at the start of `data`.
///
/// Returns the instruction and the number of bytes consumed.  Truncated
/// operands and the reserved 0x00 opcode are `SourceCorrupt`.
pub fn decode_instruction(data: &[u8]) -> Result<(Instruction<'_>, usize)> {
    let Some(&op) = data.first() else {
        return Err(DeltaError::corrupt("missing opcode"));
    };

    if op == 0 {
        return Err(DeltaError::corrupt("reserved opcode 0x00"));
    }

    if op & 0x80 == 0 {
        let len = op as usize;
        let end = 1 + len;
        if end > data.len() {
            return Err(DeltaError::corrupt(format!(
                "insert of {len} bytes runs past end of delta"
            )));
        }
        return Ok((Instruction::Insert(&data[1..end]), end));
    }

    let flags = CopyFlags::from_bits_retain(op);
    let mut pos = 1;
    let mut next = |present: bool| -> Result<usize> {
        if !present {
            return Ok(0);
        }
        let byte = *data
            .get(pos)
            .ok_or_else(|| DeltaError::corrupt("truncated copy operand"))?;
        pos += 1;
        Ok(byte as usize)
    };

    let mut offset = 0usize;
    for (i, bit) in OFFSET_BITS.iter().enumerate() {
        offset |= next(flags.contains(*bit))? << (8 * i);
    }
    let mut len = 0usize;
    for (i, bit) in LEN_BITS.iter().enumerate() {
        len |= next(flags.contains(*bit))? << (8 * i);
    }
    if len == 0 {
        len = MAX_COPY_SIZE;
    }

    Ok((Instruction::Copy { offset, len }, pos))
}
