// Fingerprint index over one or more source buffers.
//
// Sources live in one aggregate address space: each is placed at an
// aggregate offset at or after the end of the previous one, and copy
// offsets in a delta are aggregate offsets.  The index never copies source
// bytes; it borrows them for its lifetime.
//
// Layout: every sampled window becomes one `IndexEntry`.  Entries are stored
// grouped by bucket (`hash & mask`) and, inside a bucket, ordered by source
// registration then source offset.  `buckets[b]..buckets[b + 1]` is the
// entry range of bucket `b`.  Appending sources rebuilds both arrays from
// the old entries plus the fresh ones; old sources are never rescanned.

use std::fmt;
use std::mem::size_of;

use log::{debug, warn};

use super::config::{HASH_LIMIT, IndexOptions, MAX_AGGREGATE_SIZE, RABIN_WINDOW, hash_size_for};
use super::rolling::rabin_hash;
use crate::delta::header::DeltaHeader;
use crate::delta::opcode::{Instruction, decode_instruction};
use crate::error::{DeltaError, Result};

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// One contiguous source region placed in the aggregate address space.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SourceInfo<'a> {
    /// Borrowed source bytes.
    pub buf: &'a [u8],
    /// Start of this region in the aggregate address space.
    pub agg_offset: usize,
}

impl<'a> SourceInfo<'a> {
    pub fn new(buf: &'a [u8], agg_offset: usize) -> Self {
        Self { buf, agg_offset }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Aggregate offset one past the last byte.
    #[inline]
    pub fn end(&self) -> usize {
        self.agg_offset.saturating_add(self.buf.len())
    }
}

impl fmt::Debug for SourceInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceInfo")
            .field("size", &self.buf.len())
            .field("agg_offset", &self.agg_offset)
            .finish()
    }
}

/// How a registered source was indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Plain bytes, windows sampled across the whole buffer.
    Fulltext,
    /// An encoded delta, windows sampled inside its insert spans only.
    Delta,
}

#[derive(Debug, Clone, Copy)]
struct SourceRecord<'a> {
    info: SourceInfo<'a>,
    kind: SourceKind,
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One sampled window.
///
/// Offsets are local to the owning source.  `lo..hi` is the region of that
/// source a match through this entry may cover: the whole buffer for
/// fulltext sources, the enclosing insert span for delta sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    pub hash: u32,
    pub source: u32,
    pub offset: u32,
    pub lo: u32,
    pub hi: u32,
}

/// Collects the windows of one source, dropping a window whose hash equals
/// the one sampled just before it.
struct Sampler {
    source: u32,
    last_hash: Option<u32>,
    entries: Vec<IndexEntry>,
}

impl Sampler {
    fn new(source: u32, expected: usize) -> Result<Self> {
        let mut entries = Vec::new();
        entries.try_reserve(expected)?;
        Ok(Self {
            source,
            last_hash: None,
            entries,
        })
    }

    /// Sample the window at `at`; `at + RABIN_WINDOW <= hi <= buf.len()`.
    fn push(&mut self, buf: &[u8], at: usize, lo: usize, hi: usize) -> Result<()> {
        debug_assert!(lo <= at && at + RABIN_WINDOW <= hi && hi <= buf.len());
        let hash = rabin_hash(&buf[at..]);
        if self.last_hash == Some(hash) {
            return Ok(());
        }
        self.last_hash = Some(hash);
        self.entries.try_reserve(1)?;
        self.entries.push(IndexEntry {
            hash,
            source: self.source,
            offset: at as u32,
            lo: lo as u32,
            hi: hi as u32,
        });
        Ok(())
    }

    /// Apply the per-hash cap and return the surviving entries.
    fn finish(self) -> Result<Vec<IndexEntry>> {
        limit_per_hash(self.entries)
    }
}

/// Keep at most [`HASH_LIMIT`] entries per hash value, evenly spaced over
/// the original set and always including the lowest offset.
fn limit_per_hash(mut entries: Vec<IndexEntry>) -> Result<Vec<IndexEntry>> {
    entries.sort_unstable_by_key(|e| (e.hash, e.offset));
    if !entries
        .chunk_by(|a, b| a.hash == b.hash)
        .any(|group| group.len() > HASH_LIMIT)
    {
        return Ok(entries);
    }

    let mut kept = Vec::new();
    kept.try_reserve(entries.len())?;
    for group in entries.chunk_by(|a, b| a.hash == b.hash) {
        if group.len() <= HASH_LIMIT {
            kept.extend_from_slice(group);
        } else {
            kept.extend((0..HASH_LIMIT).map(|k| group[k * group.len() / HASH_LIMIT]));
        }
    }
    debug!(
        "hash limit dropped {} of {} entries",
        entries.len() - kept.len(),
        entries.len()
    );
    Ok(kept)
}

// ---------------------------------------------------------------------------
// Sampling budget
// ---------------------------------------------------------------------------

/// Window start offsets for one fulltext source.
#[derive(Debug, Clone, Copy)]
struct SamplePlan {
    count: usize,
    stride: usize,
}

impl SamplePlan {
    fn positions(self) -> impl Iterator<Item = usize> {
        (0..self.count).map(move |k| k * self.stride)
    }
}

/// Spread the entry budget over `sources` in proportion to their window
/// counts.  Without a budget every aligned window is sampled.
fn plan_sampling(sources: &[SourceInfo<'_>], opts: IndexOptions) -> Vec<SamplePlan> {
    let windows: Vec<usize> = sources.iter().map(|s| s.size() / RABIN_WINDOW).collect();
    let total: usize = windows.iter().sum();

    match opts.max_entries() {
        Some(max_entries) if total > max_entries => {
            warn!(
                "index budget of {} bytes covers {max_entries} of {total} windows; sampling sparsely",
                opts.max_bytes_to_index
            );
            sources
                .iter()
                .zip(&windows)
                .map(|(src, &w)| {
                    let count = (max_entries as u64 * w as u64 / total as u64) as usize;
                    let stride = if count == 0 {
                        RABIN_WINDOW
                    } else {
                        ((src.size() - RABIN_WINDOW) / count).max(1)
                    };
                    SamplePlan { count, stride }
                })
                .collect()
        }
        _ => windows
            .into_iter()
            .map(|count| SamplePlan {
                count,
                stride: RABIN_WINDOW,
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Bucketed fingerprint index over a growing set of borrowed sources.
#[derive(Clone)]
pub struct SourceIndex<'a> {
    sources: Vec<SourceRecord<'a>>,
    entries: Vec<IndexEntry>,
    /// Bucket start positions into `entries`; `bucket_count + 1` long.
    buckets: Vec<u32>,
    mask: u32,
}

impl Default for SourceIndex<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> SourceIndex<'a> {
    /// An index with no sources.
    pub fn new() -> Self {
        let hsize = hash_size_for(0);
        Self {
            sources: Vec::new(),
            entries: Vec::new(),
            buckets: vec![0; hsize + 1],
            mask: (hsize - 1) as u32,
        }
    }

    /// Index `sources`, appending them to `prior` when given.
    ///
    /// `prior` is left untouched; the result holds its entries plus the new
    /// ones.
    pub fn build(
        sources: &[SourceInfo<'a>],
        prior: Option<&SourceIndex<'a>>,
        opts: IndexOptions,
    ) -> Result<Self> {
        let empty;
        let base = match prior {
            Some(p) => p,
            None => {
                empty = Self::new();
                &empty
            }
        };
        base.with_sources(sources, opts)
    }

    /// Index the insert spans of an encoded delta, appending to `prior`
    /// when given.
    pub fn build_from_delta(delta: SourceInfo<'a>, prior: Option<&SourceIndex<'a>>) -> Result<Self> {
        let empty;
        let base = match prior {
            Some(p) => p,
            None => {
                empty = Self::new();
                &empty
            }
        };
        base.with_delta_source(delta)
    }

    /// Append fulltext sources in place.  On error the index is unchanged.
    pub fn add_sources(&mut self, sources: &[SourceInfo<'a>], opts: IndexOptions) -> Result<()> {
        *self = self.with_sources(sources, opts)?;
        Ok(())
    }

    /// Append an encoded delta as a source in place.  On error the index is
    /// unchanged.
    pub fn add_delta_source(&mut self, delta: SourceInfo<'a>) -> Result<()> {
        *self = self.with_delta_source(delta)?;
        Ok(())
    }

    fn with_sources(&self, sources: &[SourceInfo<'a>], opts: IndexOptions) -> Result<Self> {
        if sources.iter().all(SourceInfo::is_empty) {
            return Err(DeltaError::SourceEmpty);
        }
        self.check_placement(sources)?;

        let plans = plan_sampling(sources, opts);
        let mut fresh = Vec::new();
        fresh.try_reserve(plans.iter().map(|p| p.count).sum())?;

        for (i, (src, plan)) in sources.iter().zip(&plans).enumerate() {
            let id = self.source_id(i)?;
            let mut sampler = Sampler::new(id, plan.count)?;
            for at in plan.positions() {
                sampler.push(src.buf, at, 0, src.size())?;
            }
            fresh.extend(sampler.finish()?);
        }

        let records = sources.iter().map(|&info| SourceRecord {
            info,
            kind: SourceKind::Fulltext,
        });
        let merged = self.merged(records, fresh)?;
        debug!(
            "indexed {} sources ({} bytes): {} entries in {} buckets, aggregate end {}",
            sources.len(),
            sources.iter().map(SourceInfo::size).sum::<usize>(),
            merged.entry_count(),
            merged.bucket_count(),
            merged.aggregate_size()
        );
        Ok(merged)
    }

    fn with_delta_source(&self, delta: SourceInfo<'a>) -> Result<Self> {
        if delta.is_empty() {
            return Err(DeltaError::SourceEmpty);
        }
        self.check_placement(std::slice::from_ref(&delta))?;

        let buf = delta.buf;
        let id = self.source_id(0)?;
        let mut sampler = Sampler::new(id, buf.len() / RABIN_WINDOW)?;

        let (_, mut pos) = DeltaHeader::parse(buf)?;
        while pos < buf.len() {
            let (ins, used) = decode_instruction(&buf[pos..])?;
            if let Instruction::Insert(data) = ins {
                let lo = pos + 1;
                let hi = lo + data.len();
                let mut at = lo;
                while hi - at >= RABIN_WINDOW {
                    sampler.push(buf, at, lo, hi)?;
                    at += RABIN_WINDOW;
                }
            }
            pos += used;
        }

        let fresh = sampler.finish()?;
        let record = SourceRecord {
            info: delta,
            kind: SourceKind::Delta,
        };
        let merged = self.merged(std::iter::once(record), fresh)?;
        debug!(
            "indexed {}-byte delta source at {}: {} entries in {} buckets",
            buf.len(),
            delta.agg_offset,
            merged.entry_count(),
            merged.bucket_count()
        );
        Ok(merged)
    }

    /// New sources must follow the current aggregate end in increasing,
    /// non-overlapping order, and the aggregate must stay addressable.
    fn check_placement(&self, sources: &[SourceInfo<'a>]) -> Result<()> {
        let limit = usize::try_from(MAX_AGGREGATE_SIZE).unwrap_or(usize::MAX);
        let mut end = self.aggregate_size() as u64;
        for (i, src) in sources.iter().enumerate() {
            let start = src.agg_offset as u64;
            if start < end {
                return Err(DeltaError::corrupt(format!(
                    "source {i} placed at aggregate offset {start}, before the current end {end}"
                )));
            }
            end = start + src.size() as u64;
            if end > MAX_AGGREGATE_SIZE || u32::try_from(src.size()).is_err() {
                return Err(DeltaError::TooLarge { limit });
            }
        }
        Ok(())
    }

    fn source_id(&self, nth_new: usize) -> Result<u32> {
        u32::try_from(self.sources.len() + nth_new).map_err(|_| DeltaError::TooLarge {
            limit: u32::MAX as usize,
        })
    }

    /// Rebuild the bucket layout over the current entries plus `fresh`.
    fn merged(
        &self,
        records: impl ExactSizeIterator<Item = SourceRecord<'a>>,
        fresh: Vec<IndexEntry>,
    ) -> Result<Self> {
        let total = self.entries.len() + fresh.len();
        let hsize = hash_size_for(total);
        let mask = (hsize - 1) as u32;

        let mut entries = Vec::new();
        entries.try_reserve_exact(total)?;
        entries.extend_from_slice(&self.entries);
        entries.extend(fresh);
        entries.sort_unstable_by_key(|e| (e.hash & mask, e.source, e.offset));

        let mut buckets = Vec::new();
        buckets.try_reserve_exact(hsize + 1)?;
        buckets.resize(hsize + 1, 0u32);
        for e in &entries {
            buckets[(e.hash & mask) as usize + 1] += 1;
        }
        for b in 0..hsize {
            buckets[b + 1] += buckets[b];
        }

        let mut sources = Vec::new();
        sources.try_reserve_exact(self.sources.len() + records.len())?;
        sources.extend_from_slice(&self.sources);
        sources.extend(records);

        Ok(Self {
            sources,
            entries,
            buckets,
            mask,
        })
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Entries sharing the bucket of `hash`, in tie-break order.  Callers
    /// still compare `entry.hash` before trusting a candidate.
    #[inline]
    pub(crate) fn bucket(&self, hash: u32) -> &[IndexEntry] {
        let b = (hash & self.mask) as usize;
        &self.entries[self.buckets[b] as usize..self.buckets[b + 1] as usize]
    }

    /// Source registered under `id`.
    #[inline]
    pub(crate) fn source(&self, id: u32) -> &SourceInfo<'a> {
        &self.sources[id as usize].info
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of registered sources, empty ones included.
    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    /// Registered sources in registration order.
    pub fn sources(&self) -> impl ExactSizeIterator<Item = (SourceInfo<'a>, SourceKind)> + '_ {
        self.sources.iter().map(|r| (r.info, r.kind))
    }

    /// Aggregate end offset of the last registered source, or 0.
    pub fn aggregate_size(&self) -> usize {
        self.sources.last().map_or(0, |r| r.info.end())
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len() - 1
    }

    /// Bytes allocated by the index, including its own header.
    pub fn sizeof(&self) -> usize {
        size_of::<Self>()
            + self.entries.capacity() * size_of::<IndexEntry>()
            + self.buckets.capacity() * size_of::<u32>()
            + self.sources.capacity() * size_of::<SourceRecord<'a>>()
    }

    /// `(aggregate offset of the window start, hash)` of entry `pos`, or
    /// `None` past the last entry.
    pub fn entry_summary(&self, pos: usize) -> Option<(usize, u32)> {
        let e = self.entries.get(pos)?;
        let src = self.source(e.source);
        Some((src.agg_offset + e.offset as usize, e.hash))
    }

    /// Position of the first entry of bucket `pos`, or `None` past the last
    /// bucket.
    pub fn hash_slot(&self, pos: usize) -> Option<usize> {
        if pos < self.bucket_count() {
            Some(self.buckets[pos] as usize)
        } else {
            None
        }
    }
}

impl fmt::Debug for SourceIndex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceIndex")
            .field("sources", &self.sources.len())
            .field("entries", &self.entries.len())
            .field("buckets", &self.bucket_count())
            .field("aggregate_size", &self.aggregate_size())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
