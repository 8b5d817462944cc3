#![no_main]
use gcdelta::{DeltaStats, SourceInfo, apply_delta, apply_delta_sources};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a delta must fail cleanly, never panic.
    let _ = apply_delta(&[], data);
    let _ = DeltaStats::from_delta(data);

    if data.len() >= 2 {
        let split = data.len() / 2;
        let (source, delta) = data.split_at(split);
        if let Ok(out) = apply_delta(source, delta) {
            let declared = DeltaStats::from_delta(delta).unwrap().header.target_size;
            assert_eq!(out.len(), declared);
        }

        // Same source behind a gap.
        let gap = data[0] as usize;
        let _ = apply_delta_sources(&[SourceInfo::new(source, gap)], delta);
    }
});
