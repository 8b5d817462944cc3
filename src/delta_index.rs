// Stateful source set for delta-compressing a stream of texts.
//
// Each added text (or delta) is placed after the previous one in the
// aggregate address space, optionally leaving a gap for bytes the caller
// stores but does not want indexed.  Deltas made here are applied against
// the concatenation of everything added, gaps included.

use std::fmt;

use log::debug;

use crate::engine::encode_target;
use crate::error::{DeltaError, Result};
use crate::hash::config::{DeltaOptions, IndexOptions};
use crate::hash::index::{SourceIndex, SourceInfo};

/// Growing fingerprint index plus the running aggregate offset.
#[derive(Clone, Default)]
pub struct DeltaIndex<'a> {
    index: SourceIndex<'a>,
    source_offset: usize,
    options: IndexOptions,
}

impl<'a> DeltaIndex<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty index whose fulltext additions use `options`.
    pub fn with_options(options: IndexOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Index containing just `source`.
    pub fn from_source(source: &'a [u8]) -> Result<Self> {
        let mut di = Self::new();
        di.add_source(source, 0)?;
        Ok(di)
    }

    /// Add a fulltext placed `unadded_bytes` after the current end.
    pub fn add_source(&mut self, source: &'a [u8], unadded_bytes: usize) -> Result<()> {
        let info = self.place(source, unadded_bytes)?;
        self.index.add_sources(&[info], self.options)?;
        self.source_offset = info.end();
        debug!("{self}: added {}-byte source", source.len());
        Ok(())
    }

    /// Add an encoded delta placed `unadded_bytes` after the current end.
    /// Only its literal bytes become matchable.
    pub fn add_delta_source(&mut self, delta: &'a [u8], unadded_bytes: usize) -> Result<()> {
        let info = self.place(delta, unadded_bytes)?;
        self.index.add_delta_source(info)?;
        self.source_offset = info.end();
        debug!("{self}: added {}-byte delta source", delta.len());
        Ok(())
    }

    fn place(&self, buf: &'a [u8], unadded_bytes: usize) -> Result<SourceInfo<'a>> {
        let agg_offset = self
            .source_offset
            .checked_add(unadded_bytes)
            .ok_or(DeltaError::TooLarge { limit: usize::MAX })?;
        Ok(SourceInfo::new(buf, agg_offset))
    }

    /// Encode `target` against everything added so far.
    ///
    /// `max_delta_size` of 0 means unlimited.
    pub fn make_delta(&self, target: &[u8], max_delta_size: usize) -> Result<Vec<u8>> {
        if self.index.num_sources() == 0 {
            return Err(DeltaError::IndexNeeded);
        }
        if target.is_empty() {
            return Err(DeltaError::BufferEmpty);
        }
        encode_target(
            &self.index,
            target,
            DeltaOptions::with_max_size(max_delta_size),
        )
    }

    /// Aggregate end offset: the source size recorded in deltas made here.
    pub fn source_offset(&self) -> usize {
        self.source_offset
    }

    pub fn num_sources(&self) -> usize {
        self.index.num_sources()
    }

    /// The underlying fingerprint index.
    pub fn index(&self) -> &SourceIndex<'a> {
        &self.index
    }
}

impl fmt::Display for DeltaIndex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeltaIndex({}, {})", self.num_sources(), self.source_offset)
    }
}

impl fmt::Debug for DeltaIndex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeltaIndex")
            .field("index", &self.index)
            .field("source_offset", &self.source_offset)
            .field("options", &self.options)
            .finish()
    }
}
