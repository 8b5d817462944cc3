// Fixed parameters of the fingerprint index and the delta format, plus the
// caller-tunable option structs.

/// Width of the Rabin fingerprint window in bytes.
pub const RABIN_WINDOW: usize = 16;

/// Right shift selecting the table index from the fingerprint.
pub const RABIN_SHIFT: u32 = 23;

/// Longest literal run one insert opcode can carry.
pub const MAX_INSERT_SIZE: usize = 0x7F;

/// Longest span one copy opcode can carry.
pub const MAX_COPY_SIZE: usize = 0x10000;

/// Maximum entries kept per (source, hash) pair.  Keeps buckets from
/// degenerating on repetitive input.
pub const HASH_LIMIT: usize = 64;

/// Smallest bucket table the index will allocate.
pub const MIN_HASH_SIZE: usize = 16;

/// Aggregate source offsets are stored as `u32`; the aggregate end may
/// reach but not pass 2^32.
pub const MAX_AGGREGATE_SIZE: u64 = 1 << 32;

/// Tuning for index construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Approximate cap on the number of source bytes sampled per call.
    /// Zero means sample every window.
    pub max_bytes_to_index: usize,
}

impl IndexOptions {
    /// Sample every window.
    pub const UNBOUNDED: Self = Self {
        max_bytes_to_index: 0,
    };

    pub fn with_max_bytes(max_bytes_to_index: usize) -> Self {
        Self { max_bytes_to_index }
    }

    /// Entry budget implied by the byte cap, or `None` when unbounded.
    pub fn max_entries(&self) -> Option<usize> {
        match self.max_bytes_to_index {
            0 => None,
            n => Some((n / RABIN_WINDOW).max(1)),
        }
    }
}

/// Tuning for delta creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaOptions {
    /// Abort with `TooLarge` once the delta would exceed this many bytes.
    /// Zero means unlimited.
    pub max_delta_size: usize,
}

impl DeltaOptions {
    pub const UNLIMITED: Self = Self { max_delta_size: 0 };

    pub fn with_max_size(max_delta_size: usize) -> Self {
        Self { max_delta_size }
    }

    /// The size limit, or `None` when unlimited.
    pub fn limit(&self) -> Option<usize> {
        (self.max_delta_size != 0).then_some(self.max_delta_size)
    }
}

/// Bucket count for `entries` index entries: a power of two of at least
/// [`MIN_HASH_SIZE`], close to a quarter of the entry count.
pub fn hash_size_for(entries: usize) -> usize {
    let target = entries / 4;
    let mut bits = 4u32;
    while (1usize << bits) < target && bits < 31 {
        bits += 1;
    }
    1usize << bits
}
