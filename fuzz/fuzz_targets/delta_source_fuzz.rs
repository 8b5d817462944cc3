#![no_main]
use gcdelta::{SourceIndex, SourceInfo, apply_delta_sources, create_delta};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let split = 1 + data[0] as usize % (data.len() - 1);
    let (base, rest) = data[1..].split_at(split - 1);
    let (delta_src, target) = rest.split_at(rest.len() / 2);

    let base_info = SourceInfo::new(base, 0);
    let prior = if base.is_empty() {
        SourceIndex::new()
    } else {
        match SourceIndex::build(&[base_info], None, Default::default()) {
            Ok(index) => index,
            Err(_) => return,
        }
    };

    // Arbitrary bytes as a delta source: rejected or indexed, never a panic.
    let delta_info = SourceInfo::new(delta_src, base.len());
    let Ok(index) = SourceIndex::build_from_delta(delta_info, Some(&prior)) else {
        return;
    };
    if target.is_empty() {
        return;
    }
    let delta = create_delta(Some(&index), target, 0).unwrap();
    let sources = [base_info, delta_info];
    let used = if base.is_empty() { &sources[1..] } else { &sources[..] };
    assert_eq!(apply_delta_sources(used, &delta).unwrap(), target);
});
