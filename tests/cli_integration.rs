#![cfg(feature = "cli")]

use std::process::Command;
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_gcdelta").to_string()
}

#[test]
fn cli_encode_decode_roundtrip() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.bin");
    let target = dir.path().join("target.bin");
    let delta = dir.path().join("delta.gcd");
    let output = dir.path().join("output.bin");

    std::fs::write(&source, b"abcde12345abcde12345 and some more shared text here").unwrap();
    std::fs::write(&target, b"abcdeXXXXXabcde12345 and some more shared text here!").unwrap();

    let st = Command::new(bin())
        .arg("--force")
        .args(["encode", "--source"])
        .arg(&source)
        .arg(&target)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(st.success());

    let st = Command::new(bin())
        .arg("--force")
        .args(["decode", "--source"])
        .arg(&source)
        .arg(&delta)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(
        std::fs::read(&output).unwrap(),
        std::fs::read(&target).unwrap()
    );
}

#[test]
fn cli_multiple_sources() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    let target = dir.path().join("t");
    let delta = dir.path().join("d");
    let output = dir.path().join("o");

    std::fs::write(&a, b"the first of two source files, indexed first\n").unwrap();
    std::fs::write(&b, b"the second of two source files, indexed after\n").unwrap();
    std::fs::write(
        &target,
        b"the second of two source files, indexed after\nthe first of two source files, indexed first\n",
    )
    .unwrap();

    let st = Command::new(bin())
        .arg("encode")
        .arg("-s")
        .arg(&a)
        .arg("-s")
        .arg(&b)
        .arg(&target)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(st.success());

    let st = Command::new(bin())
        .arg("decode")
        .arg("-s")
        .arg(&a)
        .arg("-s")
        .arg(&b)
        .arg(&delta)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(
        std::fs::read(&output).unwrap(),
        std::fs::read(&target).unwrap()
    );

    // Sources in the wrong order reconstruct something else or fail.
    let swapped = dir.path().join("swapped");
    let out = Command::new(bin())
        .arg("decode")
        .arg("-s")
        .arg(&b)
        .arg("-s")
        .arg(&a)
        .arg(&delta)
        .arg(&swapped)
        .output()
        .unwrap();
    if out.status.success() {
        assert_ne!(
            std::fs::read(&swapped).unwrap(),
            std::fs::read(&target).unwrap()
        );
    }
}

#[test]
fn cli_refuses_to_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("s");
    let target = dir.path().join("t");
    let delta = dir.path().join("d");
    std::fs::write(&source, b"source").unwrap();
    std::fs::write(&target, b"target").unwrap();
    std::fs::write(&delta, b"keep me").unwrap();

    let st = Command::new(bin())
        .args(["encode", "-s"])
        .arg(&source)
        .arg(&target)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(!st.success());
    assert_eq!(std::fs::read(&delta).unwrap(), b"keep me");
}

#[test]
fn cli_encode_honours_max_delta_size() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("t");
    let delta = dir.path().join("d");
    std::fs::write(&target, vec![b'z'; 4096]).unwrap();

    let st = Command::new(bin())
        .args(["encode", "--max-delta-size", "1K"])
        .arg(&target)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(!st.success());
}

#[test]
fn cli_decode_rejects_corrupt_delta() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("s");
    let delta = dir.path().join("d");
    let output = dir.path().join("o");
    std::fs::write(&source, b"0123456789").unwrap();
    std::fs::write(&delta, b"\x0a\x05\x00\x00\x00").unwrap();

    let out = Command::new(bin())
        .args(["decode", "-s"])
        .arg(&source)
        .arg(&delta)
        .arg(&output)
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("corrupt"), "stderr: {stderr}");
}

#[test]
fn cli_inspect_json() {
    let dir = tempdir().unwrap();
    let delta = dir.path().join("d");
    std::fs::write(&delta, b"\x16\x13\x90\x10\x03XYZ").unwrap();

    let out = Command::new(bin())
        .args(["inspect", "--json"])
        .arg(&delta)
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["source_size"], 22);
    assert_eq!(json["target_size"], 19);
    assert_eq!(json["copy_ops"], 1);
    assert_eq!(json["insert_ops"], 1);
    assert_eq!(json["ops"][0]["op"], "copy");
    assert_eq!(json["ops"][0]["len"], 16);
    assert_eq!(json["ops"][1]["op"], "insert");
}

#[test]
fn cli_inspect_text() {
    let dir = tempdir().unwrap();
    let delta = dir.path().join("d");
    std::fs::write(&delta, b"\x16\x13\x90\x10\x03XYZ").unwrap();

    let out = Command::new(bin()).arg("inspect").arg(&delta).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("COPY"));
    assert!(stdout.contains("INSERT"));
}

#[test]
fn cli_index_report() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("s");
    std::fs::write(&source, b"test text\n".repeat(20)).unwrap();

    let out = Command::new(bin())
        .args(["index", "--json"])
        .arg(&source)
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["aggregate_size"], 200);
    assert_eq!(json["sources"][0]["kind"], "fulltext");
    assert!(json["entries"].as_u64().unwrap() > 0);

    let out = Command::new(bin())
        .args(["index", "--dump"])
        .arg(&source)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("DeltaIndex(1, 200)"), "stdout: {stdout}");
}
