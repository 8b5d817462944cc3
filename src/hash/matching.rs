// Greedy source match scan.
//
// Walks the target left to right with a 16-byte window.  At each position
// the window's fingerprint is looked up in the index; every candidate with
// an equal hash is verified by direct comparison and extended forward as far
// as its indexed region allows.  The longest verified match wins (first in
// bucket order on ties), is extended backward into the pending literal run,
// and the scan resumes right after it.  Misses roll the window one byte.

use log::trace;

use super::config::RABIN_WINDOW;
use super::index::{IndexEntry, SourceIndex};
use super::rolling::{RollingHash, backward_match, forward_match};
use crate::delta::opcode::Instruction;

/// A verified match at the current scan position.
#[derive(Debug, Clone, Copy)]
struct Hit {
    entry: IndexEntry,
    len: usize,
}

/// Iterator over the instructions that rebuild `target` from an index.
///
/// Inserts are yielded unsplit (any length); copies carry aggregate offsets
/// and may exceed one opcode's reach.  The delta writer splits both.
pub struct MatchFinder<'i, 'a, 't> {
    index: &'i SourceIndex<'a>,
    target: &'t [u8],
    /// Start of the window being probed.
    pos: usize,
    /// Start of the literal run not yet emitted.
    literal_start: usize,
    /// Fingerprint of the window at `pos`, when it was rolled there.
    hash: Option<RollingHash>,
    /// Copy to yield after the literal run that preceded it.
    queued: Option<Instruction<'t>>,
}

impl<'i, 'a, 't> MatchFinder<'i, 'a, 't> {
    pub fn new(index: &'i SourceIndex<'a>, target: &'t [u8]) -> Self {
        Self {
            index,
            target,
            pos: 0,
            literal_start: 0,
            hash: None,
            queued: None,
        }
    }

    /// Longest verified match for the window at `self.pos`.
    fn best_match(&self, hash: u32) -> Option<Hit> {
        let rest = &self.target[self.pos..];
        let mut best: Option<Hit> = None;

        for entry in self.index.bucket(hash) {
            if entry.hash != hash {
                continue;
            }
            let src = self.index.source(entry.source);
            let offset = entry.offset as usize;
            let max = (entry.hi as usize - offset).min(rest.len());
            if best.is_some_and(|b| max <= b.len) {
                continue;
            }
            let len = forward_match(&src.buf[offset..], rest, max);
            // Equal hashes can still be different bytes.
            if len < RABIN_WINDOW {
                continue;
            }
            if best.is_none_or(|b| len > b.len) {
                best = Some(Hit { entry: *entry, len });
            }
        }
        best
    }

    /// Turn a hit into a copy, pulling in matching bytes from the pending
    /// literal run, and advance past it.
    fn take_hit(&mut self, hit: Hit) -> (usize, Instruction<'t>) {
        let src = self.index.source(hit.entry.source);
        let offset = hit.entry.offset as usize;
        let lo = hit.entry.lo as usize;

        let back_max = (self.pos - self.literal_start).min(offset - lo);
        let back = backward_match(
            &src.buf[offset - back_max..offset],
            &self.target[self.pos - back_max..self.pos],
            back_max,
        );

        let start = offset - back;
        let len = hit.len + back;
        assert!(
            start >= lo && start + len <= hit.entry.hi as usize && start + len <= src.size(),
            "copy {start}+{len} leaves indexed region {lo}..{} of source {}",
            hit.entry.hi,
            hit.entry.source
        );

        trace!(
            "target {}: copy {len} bytes from aggregate {} (source {}, {back} backward)",
            self.pos - back,
            src.agg_offset + start,
            hit.entry.source
        );

        let literal_end = self.pos - back;
        self.pos += hit.len;
        self.hash = None;
        (
            literal_end,
            Instruction::Copy {
                offset: src.agg_offset + start,
                len,
            },
        )
    }
}

impl<'t> Iterator for MatchFinder<'_, '_, 't> {
    type Item = Instruction<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(queued) = self.queued.take() {
            return Some(queued);
        }

        let target = self.target;
        let n = target.len();

        while self.pos + RABIN_WINDOW <= n {
            let mut hash = self
                .hash
                .take()
                .unwrap_or_else(|| RollingHash::new(&target[self.pos..]));

            if let Some(hit) = self.best_match(hash.value()) {
                let literal_start = self.literal_start;
                let (literal_end, copy) = self.take_hit(hit);
                self.literal_start = self.pos;
                if literal_end == literal_start {
                    return Some(copy);
                }
                self.queued = Some(copy);
                return Some(Instruction::Insert(&target[literal_start..literal_end]));
            }

            if self.pos + RABIN_WINDOW < n {
                hash.roll(target[self.pos], target[self.pos + RABIN_WINDOW]);
                self.hash = Some(hash);
            }
            self.pos += 1;
        }

        if self.literal_start < n {
            let literal = &target[self.literal_start..];
            self.literal_start = n;
            self.pos = n;
            return Some(Instruction::Insert(literal));
        }
        None
    }
}
