#![no_main]
use gcdelta::{DeltaIndex, SourceInfo, apply_delta, apply_delta_sources};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // First byte picks the split, second the gap before a second source.
    let payload = &data[2..];
    let split = data[0] as usize % payload.len();
    let gap = data[1] as usize;
    let (source, target) = payload.split_at(split);
    if target.is_empty() {
        return;
    }

    let delta = gcdelta::make_delta(source, target).unwrap();
    assert_eq!(apply_delta(source, &delta).unwrap(), target);

    if source.len() < 2 {
        return;
    }
    let (a, b) = source.split_at(source.len() / 2);
    let mut di = DeltaIndex::from_source(a).unwrap();
    let at = di.source_offset() + gap;
    di.add_source(b, gap).unwrap();
    let delta = di.make_delta(target, 0).unwrap();
    let sources = [SourceInfo::new(a, 0), SourceInfo::new(b, at)];
    assert_eq!(apply_delta_sources(&sources, &delta).unwrap(), target);
});
