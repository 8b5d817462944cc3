//! gcdelta: Rabin-fingerprint binary deltas over aggregated sources.
//!
//! A target buffer is encoded as copy and insert instructions against one or
//! more source buffers laid out in a single aggregate address space.  The
//! source index borrows the caller's buffers and can be grown incrementally,
//! including from the literal bytes of earlier deltas.
//!
//! The crate provides:
//! - The flat engine surface (`engine`): index construction, delta creation
//!   and application
//! - A stateful builder for chains of texts (`DeltaIndex`)
//! - The wire format pieces (`delta`) and the fingerprinting core (`hash`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use gcdelta::{DeltaIndex, apply_delta};
//!
//! let source = b"a bit of text, that\ndoes not have much in\ncommon with the next text\n";
//! let target = b"a bit of text, that\nhas some in common with the next text\n";
//!
//! let index = DeltaIndex::from_source(source).unwrap();
//! let delta = index.make_delta(target, 0).unwrap();
//! assert_eq!(apply_delta(source, &delta).unwrap(), target);
//! ```

pub mod delta;
pub mod delta_index;
pub mod engine;
pub mod error;
pub mod hash;
pub mod io;

#[cfg(feature = "cli")]
pub mod cli;

pub use delta::decoder::{AggregateSource, CopySource, DeltaStats, InstructionIter};
pub use delta_index::DeltaIndex;
pub use engine::{
    apply_delta, apply_delta_sources, build_index, build_index_from_delta, create_delta,
    entry_summary, free_index, hash_slot, make_delta, sizeof_index,
};
#[cfg(feature = "parallel")]
pub use engine::create_deltas;
pub use error::{DeltaError, Result};
pub use hash::config::{DeltaOptions, IndexOptions};
pub use hash::index::{SourceIndex, SourceInfo, SourceKind};
