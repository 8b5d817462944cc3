// Result codes shared by every entry point of the delta engine.
//
// Each variant corresponds to one failure mode of index construction,
// delta creation or delta application.  `Ok` is plain `Result::Ok`.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::delta::varint::VarIntError;

/// Errors returned by index construction, delta creation and delta application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeltaError {
    /// An allocation for the index, the delta or the reconstructed target failed.
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),

    /// A source index must be supplied to create a delta.
    #[error("a source index is required")]
    IndexNeeded,

    /// Every source passed to index construction was empty.
    #[error("source has no content")]
    SourceEmpty,

    /// A source or delta buffer is malformed.
    #[error("source is invalid or corrupt: {0}")]
    SourceCorrupt(String),

    /// The target (or delta) buffer is empty.
    #[error("buffer is empty")]
    BufferEmpty,

    /// Output would exceed the requested (or declared) size.
    #[error("delta output exceeds the {limit}-byte limit")]
    TooLarge { limit: usize },
}

impl DeltaError {
    /// Build a `SourceCorrupt` error from anything printable.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::SourceCorrupt(msg.into())
    }

    /// True for zero-length inputs, which callers usually treat as
    /// "nothing to do" rather than a failure.
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::SourceEmpty | Self::BufferEmpty)
    }
}

impl From<VarIntError> for DeltaError {
    fn from(e: VarIntError) -> Self {
        Self::SourceCorrupt(format!("bad size header: {e}"))
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DeltaError>;
