use gcdelta::{DeltaStats, apply_delta, make_delta};

#[derive(Debug)]
struct Vector {
    name: String,
    delta: Vec<u8>,
    source: Vec<u8>,
    target: Vec<u8>,
}

fn hex_to_bytes(s: &str) -> Vec<u8> {
    let s = s.trim();
    if s.is_empty() {
        return Vec::new();
    }
    assert!(
        s.len().is_multiple_of(2),
        "hex string must have even length"
    );
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn load_vectors() -> Vec<Vector> {
    let manifest = include_str!("vectors/manifest.tsv");
    manifest
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|line| {
            let parts: Vec<_> = line.split('|').collect();
            assert_eq!(parts.len(), 4, "invalid vector row: {line}");
            Vector {
                name: parts[0].to_string(),
                delta: hex_to_bytes(parts[1]),
                source: hex_to_bytes(parts[2]),
                target: hex_to_bytes(parts[3]),
            }
        })
        .collect()
}

#[test]
fn vector_database_is_non_empty() {
    let vectors = load_vectors();
    assert!(vectors.len() >= 10);
}

#[test]
fn encoder_output_is_byte_exact() {
    for v in load_vectors() {
        let delta = make_delta(&v.source, &v.target)
            .unwrap_or_else(|e| panic!("encode failed for {}: {e}", v.name));
        assert_eq!(delta, v.delta, "vector {}", v.name);
    }
}

#[test]
fn stored_deltas_apply() {
    for v in load_vectors() {
        let decoded = apply_delta(&v.source, &v.delta)
            .unwrap_or_else(|e| panic!("decode failed for {}: {e}", v.name));
        assert_eq!(decoded, v.target, "vector {}", v.name);
    }
}

#[test]
fn stored_deltas_describe_their_targets() {
    for v in load_vectors() {
        let stats = DeltaStats::from_delta(&v.delta).unwrap();
        assert_eq!(stats.header.source_size, v.source.len(), "vector {}", v.name);
        assert_eq!(stats.header.target_size, v.target.len(), "vector {}", v.name);
        assert_eq!(stats.target_bytes(), v.target.len(), "vector {}", v.name);
    }
}

#[test]
fn large_repetitive_self_delta() {
    let text3 = b"This is a bit\nof source text\nwhich is meant to be matched\n\
against other text\nexcept it also\nhas a lot more data\nat the end of the file\n";
    let big = text3.repeat(1220);
    let delta = make_delta(&big, &big).unwrap();
    // One match, split into copies of at most 0x10000 bytes.
    assert_eq!(delta, b"\xdc\x86\n\xdc\x86\n\x80\x84\x01\xb4\x02\\\x83");
    assert_eq!(apply_delta(&big, &delta).unwrap(), big);
}
