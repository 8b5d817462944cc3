// Delta engine: the flat public surface.
//
// Ties the fingerprint index and match scan (hash module) to the wire
// format (delta module):
//   - build_index / build_index_from_delta / free_index / sizeof_index
//   - create_delta (and create_deltas with the `parallel` feature)
//   - apply_delta / apply_delta_sources
//   - entry_summary / hash_slot for walking an index

use log::debug;

use crate::delta::encoder::DeltaWriter;
use crate::delta::header::DeltaHeader;
use crate::delta::opcode::Instruction;
use crate::error::{DeltaError, Result};
use crate::hash::config::{DeltaOptions, IndexOptions};
use crate::hash::index::{SourceIndex, SourceInfo};
use crate::hash::matching::MatchFinder;

pub use crate::delta::decoder::{apply_delta, apply_delta_sources};

// ---------------------------------------------------------------------------
// Index lifecycle
// ---------------------------------------------------------------------------

/// Index `sources`, appending to `prior` when given.
///
/// `max_bytes_to_index` bounds the number of sampled windows of this call
/// (0 = sample every window).  Fails with `SourceEmpty` when every source
/// is empty.
pub fn build_index<'a>(
    sources: &[SourceInfo<'a>],
    prior: Option<&SourceIndex<'a>>,
    max_bytes_to_index: usize,
) -> Result<SourceIndex<'a>> {
    SourceIndex::build(
        sources,
        prior,
        IndexOptions::with_max_bytes(max_bytes_to_index),
    )
}

/// Index only the literal bytes of an encoded delta, appending to `prior`
/// when given.  Copy opcodes and their operands are skipped.
pub fn build_index_from_delta<'a>(
    delta: SourceInfo<'a>,
    prior: Option<&SourceIndex<'a>>,
) -> Result<SourceIndex<'a>> {
    SourceIndex::build_from_delta(delta, prior)
}

/// Release an index.  `None` is a no-op.
pub fn free_index(index: Option<SourceIndex<'_>>) {
    drop(index);
}

/// Bytes held by `index`; 0 for `None`.
pub fn sizeof_index(index: Option<&SourceIndex<'_>>) -> usize {
    index.map_or(0, SourceIndex::sizeof)
}

/// `(aggregate offset, hash)` of entry `pos`, or `None` past the end.
pub fn entry_summary(index: &SourceIndex<'_>, pos: usize) -> Option<(usize, u32)> {
    index.entry_summary(pos)
}

/// First entry position of bucket `pos`, or `None` past the last bucket.
pub fn hash_slot(index: &SourceIndex<'_>, pos: usize) -> Option<usize> {
    index.hash_slot(pos)
}

// ---------------------------------------------------------------------------
// Delta creation
// ---------------------------------------------------------------------------

/// Encode `target` against the sources of `index`.
///
/// `max_delta_size` of 0 means unlimited; otherwise encoding stops with
/// `TooLarge` as soon as the output would pass it.
pub fn create_delta(
    index: Option<&SourceIndex<'_>>,
    target: &[u8],
    max_delta_size: usize,
) -> Result<Vec<u8>> {
    let index = index.ok_or(DeltaError::IndexNeeded)?;
    if target.is_empty() {
        return Err(DeltaError::BufferEmpty);
    }
    encode_target(index, target, DeltaOptions::with_max_size(max_delta_size))
}

pub(crate) fn encode_target(
    index: &SourceIndex<'_>,
    target: &[u8],
    opts: DeltaOptions,
) -> Result<Vec<u8>> {
    let header = DeltaHeader::new(index.aggregate_size(), target.len());
    let mut writer = DeltaWriter::new(header, opts.max_delta_size)?;

    let (mut copies, mut inserts) = (0usize, 0usize);
    for ins in MatchFinder::new(index, target) {
        match ins {
            Instruction::Insert(data) => {
                inserts += 1;
                writer.insert(data)?;
            }
            Instruction::Copy { offset, len } => {
                copies += 1;
                writer.copy(offset, len)?;
            }
        }
    }
    debug_assert_eq!(writer.target_written(), target.len());

    debug!(
        "delta: {} target bytes -> {} bytes ({copies} copies, {inserts} inserts)",
        target.len(),
        writer.len()
    );
    Ok(writer.finish())
}

/// Encode many targets against one shared index on the rayon pool.
///
/// Results are in `targets` order.
#[cfg(feature = "parallel")]
pub fn create_deltas(
    index: &SourceIndex<'_>,
    targets: &[&[u8]],
    max_delta_size: usize,
) -> Vec<Result<Vec<u8>>> {
    use rayon::prelude::*;

    targets
        .par_iter()
        .map(|target| create_delta(Some(index), target, max_delta_size))
        .collect()
}

// ---------------------------------------------------------------------------
// One-shot helpers
// ---------------------------------------------------------------------------

/// Delta of `target` against a single contiguous `source`.
///
/// An empty source yields an all-literal delta.
pub fn make_delta(source: &[u8], target: &[u8]) -> Result<Vec<u8>> {
    let index = if source.is_empty() {
        SourceIndex::new()
    } else {
        SourceIndex::build(&[SourceInfo::new(source, 0)], None, IndexOptions::UNBOUNDED)?
    };
    create_delta(Some(&index), target, 0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(source: &[u8], target: &[u8]) {
        let delta = make_delta(source, target).expect("encode failed");
        let reconstructed = apply_delta(source, &delta).expect("decode failed");
        assert_eq!(
            reconstructed,
            target,
            "roundtrip mismatch (source={}, target={}, delta={})",
            source.len(),
            target.len(),
            delta.len()
        );
    }

    #[test]
    fn roundtrip_identical() {
        let data = b"The quick brown fox jumps over the lazy dog.";
        roundtrip(data, data);
    }

    #[test]
    fn roundtrip_small_edit() {
        let source = b"Hello, world! This is a test of the delta engine.";
        let target = b"Hello, earth! This is a test of the delta engine.";
        roundtrip(source, target);
    }

    #[test]
    fn roundtrip_no_source() {
        roundtrip(b"", b"ABCDEFGHIJKLMNOPQRSTUVWXYZ");
    }

    #[test]
    fn roundtrip_binary_data() {
        let source: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let mut target = source.clone();
        target[100] = 0xFF;
        target[200] = 0x00;
        target[1000] = 0x42;
        roundtrip(&source, &target);
    }

    #[test]
    fn roundtrip_large_insert() {
        let source = b"Start.";
        let target = b"Start. And now a much longer piece of text that was inserted.";
        roundtrip(source, target);
    }

    #[test]
    fn delta_is_smaller_for_similar_data() {
        let source: Vec<u8> = (0..=255).cycle().take(8192).collect();
        let mut target = source.clone();
        target[4096] ^= 0xFF;
        let delta = make_delta(&source, &target).unwrap();
        assert!(
            delta.len() < target.len() / 2,
            "delta ({}) should be much smaller than target ({})",
            delta.len(),
            target.len()
        );
    }

    #[test]
    fn prefix_copy_then_literal_bytes() {
        let delta = make_delta(b"abcdefghijklmnopQRSTUV", b"abcdefghijklmnopXYZ").unwrap();
        assert_eq!(delta, b"\x16\x13\x90\x10\x03XYZ");
    }

    #[test]
    fn empty_target_is_buffer_empty() {
        let idx = build_index(&[SourceInfo::new(b"source bytes", 0)], None, 0).unwrap();
        assert_eq!(create_delta(Some(&idx), b"", 0), Err(DeltaError::BufferEmpty));
    }

    #[test]
    fn missing_index_is_index_needed() {
        assert_eq!(
            create_delta(None, b"target", 0),
            Err(DeltaError::IndexNeeded)
        );
        // The missing index is reported before the empty target.
        assert_eq!(create_delta(None, b"", 0), Err(DeltaError::IndexNeeded));
    }

    #[test]
    fn size_limit_aborts_encoding() {
        let source = vec![0u8; 64];
        let target: Vec<u8> = (0..4000u32).map(|i| (i * 7 % 253) as u8).collect();
        let idx = build_index(&[SourceInfo::new(&source, 0)], None, 0).unwrap();
        assert_eq!(
            create_delta(Some(&idx), &target, 100),
            Err(DeltaError::TooLarge { limit: 100 })
        );
        let unlimited = create_delta(Some(&idx), &target, 0).unwrap();
        let exact = create_delta(Some(&idx), &target, unlimited.len()).unwrap();
        assert_eq!(exact, unlimited);
    }

    #[test]
    fn sizeof_none_is_zero() {
        assert_eq!(sizeof_index(None), 0);
        let source = [7u8; 256];
        let idx = build_index(&[SourceInfo::new(&source, 0)], None, 0).unwrap();
        assert!(sizeof_index(Some(&idx)) > 0);
        free_index(Some(idx));
        free_index(None);
    }

    #[test]
    fn introspection_walks_all_entries() {
        let source: Vec<u8> = (0..=255u8).cycle().take(2048).collect();
        let idx = build_index(&[SourceInfo::new(&source, 100)], None, 0).unwrap();
        let mut pos = 0;
        while let Some((offset, _hash)) = entry_summary(&idx, pos) {
            assert!((100..=100 + 2048 - 16).contains(&offset));
            pos += 1;
        }
        assert_eq!(pos, idx.entry_count());

        let mut slots = 0;
        while hash_slot(&idx, slots).is_some() {
            slots += 1;
        }
        assert_eq!(slots, idx.bucket_count());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_matches_sequential() {
        let source: Vec<u8> = (0..=255u8).cycle().take(8192).collect();
        let idx = build_index(&[SourceInfo::new(&source, 0)], None, 0).unwrap();
        let targets: Vec<Vec<u8>> = (0..8)
            .map(|k| {
                let mut t = source.clone();
                t[k * 500] ^= 0x55;
                t
            })
            .collect();
        let refs: Vec<&[u8]> = targets.iter().map(Vec::as_slice).collect();
        let par = create_deltas(&idx, &refs, 0);
        for (target, delta) in refs.iter().zip(par) {
            assert_eq!(delta.unwrap(), create_delta(Some(&idx), target, 0).unwrap());
        }
    }
}
