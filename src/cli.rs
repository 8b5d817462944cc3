// Command line front end for gcdelta.
//
// Thin wrapper over the engine: encode a target against one or more source
// files, apply a delta, list a delta's opcodes, or report on the index built
// over a set of sources.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::delta::decoder::{DeltaStats, InstructionIter, apply_delta_sources};
use crate::delta::opcode::Instruction;
use crate::delta_index::DeltaIndex;
use crate::engine::{create_delta, entry_summary, hash_slot, sizeof_index};
use crate::hash::config::IndexOptions;
use crate::hash::index::{SourceIndex, SourceInfo, SourceKind};
use crate::io::{hex, layout, read_sources, sha256};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024usize),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1usize),
    };
    let num: usize = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Rabin-fingerprint binary delta encoder/decoder.
#[derive(Parser, Debug)]
#[command(
    name = "gcdelta",
    version,
    about = "Binary delta encoder/decoder over aggregated sources",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (errors only).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use twice for debug logging).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Encode a target against the given sources.
    Encode(EncodeArgs),
    /// Rebuild a target from sources and a delta.
    Decode(DecodeArgs),
    /// Print a delta's header and opcodes.
    Inspect(InspectArgs),
    /// Build an index over sources and report on it.
    Index(IndexArgs),
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Source file; repeat to lay several out back to back.
    #[arg(long, short = 's', value_hint = ValueHint::FilePath)]
    source: Vec<PathBuf>,

    /// Abort if the delta would exceed this size (0 = unlimited).
    #[arg(long = "max-delta-size", value_parser = parse_byte_size, default_value = "0")]
    max_delta_size: usize,

    /// Sample at most about this many source bytes (0 = all).
    #[arg(long = "max-bytes-to-index", value_parser = parse_byte_size, default_value = "0")]
    max_bytes_to_index: usize,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Target file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Delta output file (default: stdout).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Source file; repeat in the order used for encoding.
    #[arg(long, short = 's', value_hint = ValueHint::FilePath)]
    source: Vec<PathBuf>,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Delta file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Only print the summary, not every opcode.
    #[arg(long)]
    summary: bool,

    /// Delta file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Encoded delta to add after the fulltext sources; only its literal
    /// bytes are indexed.  Repeatable.
    #[arg(long = "delta-source", short = 'd', value_hint = ValueHint::FilePath)]
    delta_sources: Vec<PathBuf>,

    /// Sample at most about this many source bytes (0 = all).
    #[arg(long = "max-bytes-to-index", value_parser = parse_byte_size, default_value = "0")]
    max_bytes_to_index: usize,

    /// Print every entry as `offset hash`.
    #[arg(long)]
    dump: bool,

    /// Fulltext source files.
    #[arg(value_hint = ValueHint::FilePath)]
    sources: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal options
// ---------------------------------------------------------------------------

struct Options {
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
}

impl Options {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            force: cli.force,
            quiet: cli.quiet,
            verbose: cli.verbose.min(2),
            json_output: cli.json_output,
        }
    }

    fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, _) => "debug",
        }
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("gcdelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = Options::from_cli(&cli).log_filter();
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn read_input(path: Option<&Path>) -> io::Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path),
        None => {
            let mut buf = Vec::new();
            io::stdin().lock().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn open_output(
    path: Option<&Path>,
    use_stdout: bool,
    force: bool,
) -> Result<Box<dyn Write>, String> {
    match (use_stdout, path) {
        (true, _) | (_, None) => Ok(Box::new(BufWriter::with_capacity(
            BUF_SIZE,
            io::stdout().lock(),
        ))),
        (false, Some(path)) => {
            if path.exists() && !force {
                return Err(format!(
                    "output file exists, use -f to overwrite: {}",
                    path.display()
                ));
            }
            File::create(path)
                .map(|f| Box::new(BufWriter::with_capacity(BUF_SIZE, f)) as Box<dyn Write>)
                .map_err(|e| format!("output file: {}: {e}", path.display()))
        }
    }
}

fn load_sources(paths: &[PathBuf]) -> Option<Vec<Vec<u8>>> {
    match read_sources(paths) {
        Ok(bufs) => Some(bufs),
        Err(e) => {
            eprintln!("gcdelta: source file: {e}");
            None
        }
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => eprintln!("{s}"),
        Err(e) => eprintln!("gcdelta: json: {e}"),
    }
}

fn digest_json(digest: Option<[u8; 32]>) -> serde_json::Value {
    digest.map_or(serde_json::Value::Null, |d| hex(&d).into())
}

// ---------------------------------------------------------------------------
// Encode command
// ---------------------------------------------------------------------------

fn cmd_encode(opts: &Options, args: &EncodeArgs) -> i32 {
    let Some(sources) = load_sources(&args.source) else {
        return 1;
    };
    let target = match read_input(args.input.as_deref()) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("gcdelta: input: {e}");
            return 1;
        }
    };
    let infos = layout(&sources);
    let index = if infos.iter().all(SourceInfo::is_empty) {
        Ok(SourceIndex::new())
    } else {
        SourceIndex::build(
            &infos,
            None,
            IndexOptions::with_max_bytes(args.max_bytes_to_index),
        )
    };
    let delta = match index.and_then(|idx| create_delta(Some(&idx), &target, args.max_delta_size)) {
        Ok(delta) => delta,
        Err(e) => {
            eprintln!("gcdelta: encode error: {e}");
            return 1;
        }
    };

    let mut output = match open_output(args.output.as_deref(), args.stdout, opts.force) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("gcdelta: {e}");
            return 1;
        }
    };
    if let Err(e) = output.write_all(&delta).and_then(|()| output.flush()) {
        eprintln!("gcdelta: write error: {e}");
        return 1;
    }

    let source_size = infos.last().map_or(0, SourceInfo::end);
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "gcdelta: encoder: sources: {}, source size: {source_size}, target size: {}, delta size: {}",
            sources.len(),
            target.len(),
            delta.len()
        );
    }

    if opts.json_output {
        print_json(&serde_json::json!({
            "command": "encode",
            "sources": sources.len(),
            "source_size": source_size,
            "target_size": target.len(),
            "delta_size": delta.len(),
            "target_sha256": digest_json(sha256([target.as_slice()])),
        }));
    }

    0
}

// ---------------------------------------------------------------------------
// Decode command
// ---------------------------------------------------------------------------

fn cmd_decode(opts: &Options, args: &DecodeArgs) -> i32 {
    let Some(sources) = load_sources(&args.source) else {
        return 1;
    };
    let delta = match read_input(args.input.as_deref()) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("gcdelta: input: {e}");
            return 1;
        }
    };

    let infos = layout(&sources);
    let target = match apply_delta_sources(&infos, &delta) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("gcdelta: decode error: {e}");
            return 1;
        }
    };

    let mut output = match open_output(args.output.as_deref(), args.stdout, opts.force) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("gcdelta: {e}");
            return 1;
        }
    };
    if let Err(e) = output.write_all(&target).and_then(|()| output.flush()) {
        eprintln!("gcdelta: write error: {e}");
        return 1;
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "gcdelta: decoder: delta size: {}, output size: {}",
            delta.len(),
            target.len()
        );
    }

    if opts.json_output {
        print_json(&serde_json::json!({
            "command": "decode",
            "delta_size": delta.len(),
            "output_size": target.len(),
            "output_sha256": digest_json(sha256([target.as_slice()])),
        }));
    }

    0
}

// ---------------------------------------------------------------------------
// Inspect command
// ---------------------------------------------------------------------------

fn cmd_inspect(opts: &Options, args: &InspectArgs) -> i32 {
    let delta = match std::fs::read(&args.input) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("gcdelta: {}: {e}", args.input.display());
            return 1;
        }
    };

    let stats = match DeltaStats::from_delta(&delta) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("gcdelta: invalid delta: {e}");
            return 1;
        }
    };

    if opts.json_output {
        let mut ops = Vec::new();
        if !args.summary {
            let Ok((_, iter)) = InstructionIter::new(&delta) else {
                return 1;
            };
            for ins in iter.flatten() {
                ops.push(match ins {
                    Instruction::Copy { offset, len } => {
                        serde_json::json!({ "op": "copy", "offset": offset, "len": len })
                    }
                    Instruction::Insert(data) => {
                        serde_json::json!({ "op": "insert", "len": data.len() })
                    }
                });
            }
        }
        let value = serde_json::json!({
            "source_size": stats.header.source_size,
            "target_size": stats.header.target_size,
            "delta_size": stats.delta_size,
            "copy_ops": stats.copy_ops,
            "copied_bytes": stats.copied_bytes,
            "insert_ops": stats.insert_ops,
            "inserted_bytes": stats.inserted_bytes,
            "ops": ops,
        });
        match serde_json::to_string_pretty(&value) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("gcdelta: json: {e}");
                return 1;
            }
        }
        return 0;
    }

    println!("source size:      {}", stats.header.source_size);
    println!("target size:      {}", stats.header.target_size);
    println!("delta size:       {}", stats.delta_size);
    println!(
        "copies:           {} ({} bytes)",
        stats.copy_ops, stats.copied_bytes
    );
    println!(
        "inserts:          {} ({} bytes)",
        stats.insert_ops, stats.inserted_bytes
    );
    println!("ratio:            {:.4}", stats.ratio());

    if args.summary {
        return 0;
    }

    let Ok((_, mut iter)) = InstructionIter::new(&delta) else {
        return 1;
    };
    println!();
    println!("  POSITION  TARGET      OP      DETAIL");
    let mut target_pos = 0usize;
    loop {
        let at = iter.position();
        let Some(ins) = iter.next() else { break };
        let ins = match ins {
            Ok(ins) => ins,
            Err(e) => {
                eprintln!("gcdelta: opcode at {at}: {e}");
                return 1;
            }
        };
        match ins {
            Instruction::Copy { offset, len } => {
                println!("  {at:>8}  {target_pos:>10}  COPY    {len} bytes from {offset}");
            }
            Instruction::Insert(data) => {
                println!(
                    "  {at:>8}  {target_pos:>10}  INSERT  {} bytes {:?}",
                    data.len(),
                    String::from_utf8_lossy(&data[..data.len().min(24)])
                );
            }
        }
        target_pos += ins.target_len();
    }

    0
}

// ---------------------------------------------------------------------------
// Index command
// ---------------------------------------------------------------------------

fn cmd_index(opts: &Options, args: &IndexArgs) -> i32 {
    let Some(fulltexts) = load_sources(&args.sources) else {
        return 1;
    };
    let Some(deltas) = load_sources(&args.delta_sources) else {
        return 1;
    };

    let mut di = DeltaIndex::with_options(IndexOptions::with_max_bytes(args.max_bytes_to_index));
    for (path, buf) in args.sources.iter().zip(&fulltexts) {
        if let Err(e) = di.add_source(buf, 0) {
            eprintln!("gcdelta: {}: {e}", path.display());
            return 1;
        }
    }
    for (path, buf) in args.delta_sources.iter().zip(&deltas) {
        if let Err(e) = di.add_delta_source(buf, 0) {
            eprintln!("gcdelta: {}: {e}", path.display());
            return 1;
        }
    }

    let index = di.index();
    if opts.json_output {
        let sources: Vec<_> = index
            .sources()
            .map(|(info, kind)| {
                serde_json::json!({
                    "offset": info.agg_offset,
                    "size": info.size(),
                    "kind": match kind {
                        SourceKind::Fulltext => "fulltext",
                        SourceKind::Delta => "delta",
                    },
                })
            })
            .collect();
        let value = serde_json::json!({
            "sources": sources,
            "aggregate_size": index.aggregate_size(),
            "entries": index.entry_count(),
            "buckets": index.bucket_count(),
            "sizeof": sizeof_index(Some(index)),
        });
        match serde_json::to_string_pretty(&value) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("gcdelta: json: {e}");
                return 1;
            }
        }
    } else {
        println!("{di}");
        for (info, kind) in index.sources() {
            println!("  {info:?} {kind:?}");
        }
        println!("aggregate size:   {}", index.aggregate_size());
        println!("entries:          {}", index.entry_count());
        println!("buckets:          {}", index.bucket_count());
        println!("memory:           {} bytes", sizeof_index(Some(index)));
    }

    if args.dump {
        let mut slot = 0;
        while let Some(start) = hash_slot(index, slot) {
            let end = hash_slot(index, slot + 1).unwrap_or(index.entry_count());
            for pos in start..end {
                if let Some((offset, hash)) = entry_summary(index, pos) {
                    println!("{slot:>8} {offset:>12} {hash:08x}");
                }
            }
            slot += 1;
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = Options::from_cli(&cli);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(opts.log_filter()))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match &cli.command {
        Cmd::Encode(args) => cmd_encode(&opts, args),
        Cmd::Decode(args) => cmd_decode(&opts, args),
        Cmd::Inspect(args) => cmd_inspect(&opts, args),
        Cmd::Index(args) => cmd_index(&opts, args),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
