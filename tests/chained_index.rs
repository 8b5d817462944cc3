use gcdelta::delta::opcode::Instruction;
use gcdelta::{
    DeltaError, DeltaIndex, InstructionIter, SourceInfo, apply_delta_sources, build_index,
    build_index_from_delta, create_delta,
};

const FIRST: &[u8] = b"a bit of text, that\ndoes not have much in\ncommon with the next text\n";
const SECOND: &[u8] = b"some more bit of text, that\ndoes not have much in\n\
common with the previous text\nand has some extra text\n";
const THIRD: &[u8] = b"a bit of text, that\nhas some in common with the previous text\n\
and has some extra text\nand not have much in\ncommon with the next text\n";
const FOURTH: &[u8] = b"123456789012345\nsame rabin hash\n123456789012345\nsame rabin hash\n\
123456789012345\nsame rabin hash\n123456789012345\nsame rabin hash\n";

/// Byte ranges of `delta` holding insert literals.
fn insert_spans(delta: &[u8]) -> Vec<(usize, usize)> {
    let (_, mut iter) = InstructionIter::new(delta).unwrap();
    let mut spans = Vec::new();
    loop {
        let at = iter.position();
        match iter.next() {
            Some(Ok(Instruction::Insert(data))) => spans.push((at + 1, at + 1 + data.len())),
            Some(Ok(_)) => {}
            Some(Err(e)) => panic!("bad delta: {e}"),
            None => break,
        }
    }
    spans
}

/// Every copy of `delta` that lands in `source` must stay inside one of its
/// insert spans.
fn assert_copies_hit_literals(delta: &[u8], source: SourceInfo<'_>) {
    let spans = insert_spans(source.buf);
    let (_, iter) = InstructionIter::new(delta).unwrap();
    for ins in iter {
        let Instruction::Copy { offset, len } = ins.unwrap() else {
            continue;
        };
        if offset + len <= source.agg_offset || offset >= source.end() {
            continue;
        }
        let lo = offset - source.agg_offset;
        let hi = lo + len;
        assert!(
            spans.iter().any(|&(s, e)| s <= lo && hi <= e),
            "copy {lo}..{hi} reads control bytes of the delta source (spans {spans:?})"
        );
    }
}

#[test]
fn delta_index_chain_matches_known_output() {
    let mut di = DeltaIndex::new();
    di.add_source(FIRST, 0).unwrap();

    let d1 = di.make_delta(SECOND, 0).unwrap();
    assert_eq!(
        d1,
        b"Dh\tsome more\x91\x019&previous text\nand has some extra text\n"
    );
    di.add_delta_source(&d1, 0).unwrap();
    assert_eq!(di.to_string(), "DeltaIndex(2, 122)");

    let d2 = di.make_delta(THIRD, 0).unwrap();
    assert_eq!(
        d2,
        b"z\x85\x01\x90\x14\x1chas some in common with the \x91T&\x03and\x91\x18,"
    );
    di.add_delta_source(&d2, 0).unwrap();
    assert_eq!(di.source_offset(), 166);

    // The insert added by d2 is now a copy source.
    let d3 = di.make_delta(THIRD, 0).unwrap();
    assert_eq!(d3, b"\xa6\x01\x85\x01\x90\x14\x91\x80\x1c\x91T&\x03and\x91\x18,");

    let d4 = di.make_delta(FOURTH, 0).unwrap();
    let mut expected = b"\xa6\x01\x80\x01\x7f".to_vec();
    expected.extend_from_slice(&FOURTH[..127]);
    expected.extend_from_slice(b"\x01\n");
    assert_eq!(d4, expected);
    di.add_delta_source(&d4, 0).unwrap();

    let d5 = di.make_delta(FOURTH, 0).unwrap();
    assert_eq!(d5, b"\xac\x02\x80\x01\x91\xab\x7f\x01\n");

    let sources = [
        SourceInfo::new(FIRST, 0),
        SourceInfo::new(&d1, 68),
        SourceInfo::new(&d2, 122),
        SourceInfo::new(&d4, 166),
    ];
    assert_eq!(apply_delta_sources(&sources, &d5).unwrap(), FOURTH);
    assert_eq!(apply_delta_sources(&sources[..3], &d3).unwrap(), THIRD);
}

#[test]
fn copies_never_read_delta_control_bytes() {
    let mut di = DeltaIndex::new();
    di.add_source(FIRST, 0).unwrap();
    let d1 = di.make_delta(SECOND, 0).unwrap();
    di.add_delta_source(&d1, 0).unwrap();
    let d2 = di.make_delta(THIRD, 0).unwrap();
    di.add_delta_source(&d2, 0).unwrap();

    for target in [SECOND, THIRD, FOURTH] {
        let delta = di.make_delta(target, 0).unwrap();
        assert_copies_hit_literals(&delta, SourceInfo::new(&d1, 68));
        assert_copies_hit_literals(&delta, SourceInfo::new(&d2, 122));
    }
}

#[test]
fn flat_surface_builds_the_same_chain() {
    let base = build_index(&[SourceInfo::new(FIRST, 0)], None, 0).unwrap();
    let d1 = create_delta(Some(&base), SECOND, 0).unwrap();

    let chained = build_index_from_delta(SourceInfo::new(&d1, FIRST.len()), Some(&base)).unwrap();
    assert_eq!(base.num_sources(), 1, "prior index is left untouched");
    assert_eq!(chained.num_sources(), 2);
    assert_eq!(chained.aggregate_size(), 122);

    let d2 = create_delta(Some(&chained), THIRD, 0).unwrap();
    let mut di = DeltaIndex::from_source(FIRST).unwrap();
    di.add_delta_source(&d1, 0).unwrap();
    assert_eq!(d2, di.make_delta(THIRD, 0).unwrap());
}

#[test]
fn delta_source_with_only_copies_has_no_entries() {
    let base = build_index(&[SourceInfo::new(THIRD, 0)], None, 0).unwrap();
    let self_delta = create_delta(Some(&base), THIRD, 0).unwrap();
    assert!(insert_spans(&self_delta).is_empty());

    let chained =
        build_index_from_delta(SourceInfo::new(&self_delta, THIRD.len()), Some(&base)).unwrap();
    assert_eq!(chained.entry_count(), base.entry_count());
}

#[test]
fn delta_sources_must_follow_the_aggregate_end() {
    let base = build_index(&[SourceInfo::new(FIRST, 0)], None, 0).unwrap();
    let d1 = create_delta(Some(&base), SECOND, 0).unwrap();
    let err = build_index_from_delta(SourceInfo::new(&d1, 10), Some(&base)).unwrap_err();
    assert!(matches!(err, DeltaError::SourceCorrupt(_)), "{err:?}");
}

#[test]
fn malformed_delta_sources_are_rejected() {
    let cases: [&[u8]; 4] = [
        b"\x05\x05\x00",      // reserved opcode
        b"\x05\x05\x09abc",   // insert runs past the end
        b"\x05\x05\x91\x01",  // copy operand truncated
        b"\x85",              // header truncated
    ];
    for delta in cases {
        let err = build_index_from_delta(SourceInfo::new(delta, 0), None).unwrap_err();
        assert!(
            matches!(err, DeltaError::SourceCorrupt(_)),
            "{delta:?} gave {err:?}"
        );
    }
    assert_eq!(
        build_index_from_delta(SourceInfo::new(b"", 0), None).unwrap_err(),
        DeltaError::SourceEmpty
    );
}
