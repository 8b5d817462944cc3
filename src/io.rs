// File-level helpers for delta creation and application.
//
// Provides `diff_files()` and `patch_files()`, which read the sources fully
// into memory, lay them out back to back in the aggregate address space and
// run the engine over them.  Optionally computes SHA-256 digests (feature
// `file-io`).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::info;
use thiserror::Error;

use crate::delta::decoder::{DeltaStats, apply_delta_sources};
use crate::engine::create_delta;
use crate::error::DeltaError;
use crate::hash::config::{DeltaOptions, IndexOptions};
use crate::hash::index::{SourceIndex, SourceInfo};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `diff_files()`.
#[derive(Debug, Clone)]
pub struct DiffStats {
    /// Aggregate size of all source files.
    pub source_size: u64,
    /// Target file size in bytes.
    pub target_size: u64,
    /// Delta output size in bytes.
    pub delta_size: u64,
    /// Number of copy opcodes written.
    pub copy_ops: usize,
    /// Number of insert opcodes written.
    pub insert_ops: usize,
    /// SHA-256 of the concatenated sources (if `file-io` is enabled).
    pub source_sha256: Option<[u8; 32]>,
    /// SHA-256 of the target (if `file-io` is enabled).
    pub target_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `patch_files()`.
#[derive(Debug, Clone)]
pub struct PatchStats {
    /// Aggregate size of all source files.
    pub source_size: u64,
    /// Delta file size in bytes.
    pub delta_size: u64,
    /// Reconstructed output size in bytes.
    pub output_size: u64,
    /// SHA-256 of the reconstructed output (if `file-io` is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("delta error: {0}")]
    Delta(#[from] DeltaError),
}

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read every file in `paths` fully into memory.
pub fn read_sources<P: AsRef<Path>>(paths: &[P]) -> io::Result<Vec<Vec<u8>>> {
    paths.iter().map(std::fs::read).collect()
}

/// Place `bufs` back to back starting at aggregate offset 0.
pub fn layout(bufs: &[Vec<u8>]) -> Vec<SourceInfo<'_>> {
    let mut offset = 0;
    bufs.iter()
        .map(|buf| {
            let info = SourceInfo::new(buf, offset);
            offset += buf.len();
            info
        })
        .collect()
}

fn write_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut w = BufWriter::with_capacity(BUF_SIZE, File::create(path)?);
    w.write_all(data)?;
    w.flush()
}

/// SHA-256 over `chunks` in order; `None` without the `file-io` feature.
#[cfg(feature = "file-io")]
pub fn sha256<'d>(chunks: impl IntoIterator<Item = &'d [u8]>) -> Option<[u8; 32]> {
    use sha2::Digest;
    let mut h = sha2::Sha256::new();
    for chunk in chunks {
        h.update(chunk);
    }
    Some(h.finalize().into())
}

#[cfg(not(feature = "file-io"))]
pub fn sha256<'d>(_chunks: impl IntoIterator<Item = &'d [u8]>) -> Option<[u8; 32]> {
    None
}

/// Lowercase hex rendering of a digest.
pub fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// diff_files
// ---------------------------------------------------------------------------

/// Encode `target_path` against the concatenation of `source_paths`,
/// writing the delta to `delta_path`.
///
/// Sources are read fully into memory and indexed once.  If every source is
/// empty the delta is all literals.
pub fn diff_files<P: AsRef<Path>>(
    source_paths: &[P],
    target_path: &Path,
    delta_path: &Path,
    index_opts: IndexOptions,
    delta_opts: DeltaOptions,
) -> Result<DiffStats, IoError> {
    let sources = read_sources(source_paths)?;
    let target = std::fs::read(target_path)?;
    let infos = layout(&sources);

    let index = if infos.iter().all(SourceInfo::is_empty) {
        SourceIndex::new()
    } else {
        SourceIndex::build(&infos, None, index_opts)?
    };
    let delta = create_delta(Some(&index), &target, delta_opts.max_delta_size)?;
    write_file(delta_path, &delta)?;

    let stats = DeltaStats::from_delta(&delta)?;
    info!(
        "{}: {} bytes -> {} byte delta ({} sources, {} copies, {} inserts)",
        target_path.display(),
        target.len(),
        delta.len(),
        sources.len(),
        stats.copy_ops,
        stats.insert_ops
    );

    Ok(DiffStats {
        source_size: index.aggregate_size() as u64,
        target_size: target.len() as u64,
        delta_size: delta.len() as u64,
        copy_ops: stats.copy_ops,
        insert_ops: stats.insert_ops,
        source_sha256: sha256(sources.iter().map(Vec::as_slice)),
        target_sha256: sha256([target.as_slice()]),
    })
}

// ---------------------------------------------------------------------------
// patch_files
// ---------------------------------------------------------------------------

/// Rebuild a target from the concatenation of `source_paths` and the delta
/// in `delta_path`, writing it to `output_path`.
pub fn patch_files<P: AsRef<Path>>(
    source_paths: &[P],
    delta_path: &Path,
    output_path: &Path,
) -> Result<PatchStats, IoError> {
    let sources = read_sources(source_paths)?;
    let delta = std::fs::read(delta_path)?;
    let infos = layout(&sources);

    let output = apply_delta_sources(&infos, &delta)?;
    write_file(output_path, &output)?;

    info!(
        "{}: {} byte delta -> {} bytes",
        output_path.display(),
        delta.len(),
        output.len()
    );

    Ok(PatchStats {
        source_size: infos.last().map_or(0, SourceInfo::end) as u64,
        delta_size: delta.len() as u64,
        output_size: output.len() as u64,
        output_sha256: sha256([output.as_slice()]),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_temp(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn diff_patch_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let source_data = b"The quick brown fox jumps over the lazy dog. 1234567890";
        let target_data = b"The quick brown cat sits on the lazy mat. 1234567890!!!";

        let source = write_temp(&dir, "source.bin", source_data);
        let target = write_temp(&dir, "target.bin", target_data);
        let delta = dir.path().join("delta.gcd");
        let output = dir.path().join("output.bin");

        let diff = diff_files(
            &[&source],
            &target,
            &delta,
            IndexOptions::default(),
            DeltaOptions::default(),
        )
        .unwrap();
        assert_eq!(diff.source_size, source_data.len() as u64);
        assert_eq!(diff.target_size, target_data.len() as u64);
        assert!(diff.delta_size > 0);

        let patch = patch_files(&[&source], &delta, &output).unwrap();
        assert_eq!(patch.output_size, target_data.len() as u64);
        assert_eq!(std::fs::read(&output).unwrap(), target_data);
    }

    #[test]
    fn several_sources_are_concatenated() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_temp(&dir, "a", b"first source file with some shared text\n");
        let b = write_temp(&dir, "b", b"second source file, also with shared text\n");
        let target = write_temp(
            &dir,
            "t",
            b"second source file, also with shared text\nfirst source file with some shared text\n",
        );
        let delta = dir.path().join("d");
        let output = dir.path().join("o");

        let diff = diff_files(
            &[&a, &b],
            &target,
            &delta,
            IndexOptions::default(),
            DeltaOptions::default(),
        )
        .unwrap();
        assert!(diff.copy_ops >= 2);
        assert!(diff.delta_size < diff.target_size);

        patch_files(&[&a, &b], &delta, &output).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&target).unwrap());
    }

    #[test]
    fn empty_source_gives_literal_delta() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_temp(&dir, "empty", b"");
        let target = write_temp(&dir, "target", b"standalone data without any source");
        let delta = dir.path().join("delta");
        let output = dir.path().join("output");

        let diff = diff_files(
            &[&source],
            &target,
            &delta,
            IndexOptions::default(),
            DeltaOptions::default(),
        )
        .unwrap();
        assert_eq!(diff.copy_ops, 0);

        patch_files(&[&source], &delta, &output).unwrap();
        assert_eq!(
            std::fs::read(&output).unwrap(),
            b"standalone data without any source"
        );
    }

    #[test]
    fn empty_target_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_temp(&dir, "s", b"some source");
        let target = write_temp(&dir, "t", b"");
        let err = diff_files(
            &[&source],
            &target,
            &dir.path().join("d"),
            IndexOptions::default(),
            DeltaOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IoError::Delta(DeltaError::BufferEmpty)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = patch_files(
            &[dir.path().join("nope")],
            &dir.path().join("d"),
            &dir.path().join("o"),
        )
        .unwrap_err();
        assert!(matches!(err, IoError::Io(_)));
    }

    #[cfg(feature = "file-io")]
    #[test]
    fn sha256_digests_match() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_temp(&dir, "s", b"source for checksum test");
        let target = write_temp(&dir, "t", b"target for checksum test");
        let delta = dir.path().join("d");
        let output = dir.path().join("o");

        let diff = diff_files(
            &[&source],
            &target,
            &delta,
            IndexOptions::default(),
            DeltaOptions::default(),
        )
        .unwrap();
        let patch = patch_files(&[&source], &delta, &output).unwrap();
        assert!(diff.source_sha256.is_some());
        assert_eq!(patch.output_sha256, diff.target_sha256);
        assert_eq!(
            hex(&diff.target_sha256.unwrap()).len(),
            64,
            "hex digest is 64 characters"
        );
    }
}
