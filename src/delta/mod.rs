// Delta wire format.
//
// # Modules
//
// - `varint`   little-endian base-128 integers used by the header
// - `header`   source size and target size
// - `opcode`   insert/copy opcode encoding
// - `encoder`  size-limited delta writer
// - `decoder`  instruction walking and delta application

pub mod decoder;
pub mod encoder;
pub mod header;
pub mod opcode;
pub mod varint;

pub use decoder::{
    AggregateSource, CopySource, DeltaStats, InstructionIter, apply_delta, apply_delta_sources,
};
pub use encoder::DeltaWriter;
pub use header::{DELTA_SIZE_MIN, DeltaHeader};
pub use opcode::{CopyFlags, Instruction};
