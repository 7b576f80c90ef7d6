// Command-line front end for vcdelta.
//
// Wires files and standard streams to the library API:
//   encode  dictionary + target  -> delta
//   decode  dictionary + delta   -> target
//   info    delta                -> header summary

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::compress::decoder::{DEFAULT_READ_SIZE, DecodeOptions, DeltaDecoder};
use crate::compress::encoder::{self, EncodeError, EncodeOptions, EncodeStats};
use crate::hash::config::MAX_CHUNK_SIZE;
use crate::source::{ByteSource, MemorySource, ReaderSource};
use crate::vcdiff::header::{FileHeader, WindowHeader};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Block-hash VCDIFF delta encoder/decoder.
#[derive(Parser, Debug)]
#[command(
    name = "vcdelta",
    version,
    about = "Block-hash VCDIFF delta encoder/decoder",
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

    /// Verbose mode (repeat for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print stats as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Delta encode a target against a dictionary.
    Encode(EncodeArgs),
    /// Rebuild a target from a dictionary and a delta.
    Decode(DecodeArgs),
    /// Print the file header and every window header of a delta.
    Info(InfoArgs),
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Dictionary file to copy from.
    #[arg(long = "dictionary", short = 's', value_hint = ValueHint::FilePath)]
    dictionary: PathBuf,

    /// Write the interleaved ('S') layout.
    #[arg(long)]
    interleaved: bool,

    /// Add an Adler-32 checksum to every window.
    #[arg(long)]
    checksum: bool,

    /// Chunk (window) size in MiB.
    #[arg(long = "chunk-size-mib", value_parser = clap::value_parser!(u64).range(1..=64), conflicts_with = "chunk_size")]
    chunk_size_mib: Option<u64>,

    /// Chunk (window) size in bytes (supports K/M/G suffix).
    #[arg(long = "chunk-size", value_parser = parse_byte_size)]
    chunk_size: Option<u64>,

    /// Target file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Delta output file (default: stdout).
    #[arg(short = 'o', long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Dictionary file to copy from.
    #[arg(long = "dictionary", short = 's', value_hint = ValueHint::FilePath)]
    dictionary: PathBuf,

    /// Skip Adler-32 verification.
    #[arg(long = "no-verify")]
    no_verify: bool,

    /// Read step for interleaved window bodies (supports K/M/G suffix).
    #[arg(long = "read-size", value_parser = parse_byte_size, default_value_t = DEFAULT_READ_SIZE as u64)]
    read_size: u64,

    /// Largest accepted target window (supports K/M/G suffix).
    #[arg(long = "max-window", value_parser = parse_byte_size, default_value_t = MAX_CHUNK_SIZE as u64)]
    max_window: u64,

    /// Delta file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(short = 'o', long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Delta file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,
}

/// Flags shared by every command.
#[derive(Debug, Clone, Copy)]
struct Global {
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
}

// ---------------------------------------------------------------------------
// Option mapping
// ---------------------------------------------------------------------------

fn build_encode_options(args: &EncodeArgs) -> Result<EncodeOptions, String> {
    let opts = EncodeOptions::default()
        .with_interleaved(args.interleaved)
        .with_checksum(args.checksum);
    let opts = match (args.chunk_size_mib, args.chunk_size) {
        (Some(mib), _) => opts.with_chunk_size_mib(mib as usize),
        (None, Some(bytes)) => {
            let bytes = usize::try_from(bytes).map_err(|_| format!("chunk size {bytes} too large"))?;
            opts.with_chunk_size(bytes)
        }
        (None, None) => Ok(opts),
    };
    opts.map_err(|e| e.to_string())
}

fn build_decode_options(args: &DecodeArgs) -> DecodeOptions {
    let read_size = usize::try_from(args.read_size).unwrap_or(usize::MAX);
    DecodeOptions {
        max_target_window: args.max_window,
        ..DecodeOptions::default()
    }
    .with_verify_checksum(!args.no_verify)
    .with_read_size(read_size)
}

fn log_filter(global: &Global) -> &'static str {
    match (global.quiet, global.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    }
}

// ---------------------------------------------------------------------------
// I/O helpers
// ---------------------------------------------------------------------------

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>, String> {
    match path {
        Some(path) => {
            let f = File::open(path).map_err(|e| format!("input file: {}: {e}", path.display()))?;
            Ok(Box::new(BufReader::with_capacity(BUF_SIZE, f)))
        }
        None => Ok(Box::new(BufReader::with_capacity(BUF_SIZE, io::stdin()))),
    }
}

fn open_output(path: Option<&Path>, force: bool) -> Result<Box<dyn Write>, String> {
    match path {
        Some(path) => {
            if path.exists() && !force {
                return Err(format!(
                    "output file exists, use -f to overwrite: {}",
                    path.display()
                ));
            }
            let f =
                File::create(path).map_err(|e| format!("output file: {}: {e}", path.display()))?;
            Ok(Box::new(BufWriter::with_capacity(BUF_SIZE, f)))
        }
        None => Ok(Box::new(BufWriter::with_capacity(BUF_SIZE, io::stdout().lock()))),
    }
}

fn open_dictionary(path: &Path) -> Result<ReaderSource<File>, String> {
    File::open(path)
        .and_then(ReaderSource::new)
        .map_err(|e| format!("dictionary file: {}: {e}", path.display()))
}

fn emit_json(value: &serde_json::Value) {
    eprintln!("{value:#}");
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_encode(args: &EncodeArgs, global: &Global) -> Result<(), String> {
    let opts = build_encode_options(args)?;
    let mut dictionary = open_dictionary(&args.dictionary)?;

    let mut stdin_data = Vec::new();
    let mut file_target;
    let mut memory_target;
    let target: &mut dyn ByteSource = match &args.input {
        Some(path) => {
            let file =
                File::open(path).map_err(|e| format!("input file: {}: {e}", path.display()))?;
            file_target =
                ReaderSource::new(file).map_err(|e| format!("input file: {}: {e}", path.display()))?;
            &mut file_target
        }
        None => {
            // Standard input cannot seek; hold it in memory.
            io::stdin()
                .lock()
                .read_to_end(&mut stdin_data)
                .map_err(|e| format!("read error: {e}"))?;
            memory_target = MemorySource::new(&stdin_data);
            &mut memory_target
        }
    };

    // Refuse empty inputs before the output is created or truncated.
    if dictionary.is_empty() {
        return Err(format!("encode error: {}", EncodeError::EmptyDictionary));
    }
    if target.is_empty() {
        return Err(format!("encode error: {}", EncodeError::EmptyTarget));
    }

    let output = open_output(args.output.as_deref(), global.force)?;
    let stats: EncodeStats = encoder::encode(&mut dictionary, target, output, &opts)
        .map_err(|e| format!("encode error: {e}"))?;

    if global.verbose > 0 && !global.quiet {
        eprintln!(
            "vcdelta: encoder: dictionary size: {}, target size: {}, delta size: {}, windows: {}",
            dictionary.len(),
            stats.target_bytes,
            stats.delta_bytes,
            stats.windows
        );
    }
    if global.json_output {
        emit_json(&serde_json::json!({
            "command": "encode",
            "dictionary_size": dictionary.len(),
            "target_size": stats.target_bytes,
            "delta_size": stats.delta_bytes,
            "windows": stats.windows,
            "format": if opts.interleaved { "interleaved" } else { "standard" },
            "adds": stats.instructions.adds,
            "runs": stats.instructions.runs,
            "copies": stats.instructions.copies,
            "copy_bytes": stats.instructions.copy_bytes,
        }));
    }
    Ok(())
}

fn cmd_decode(args: &DecodeArgs, global: &Global) -> Result<(), String> {
    let opts = build_decode_options(args);
    let dictionary = open_dictionary(&args.dictionary)?
        .buffer_all()
        .map_err(|e| format!("dictionary file: {}: {e}", args.dictionary.display()))?;
    let input = open_input(args.input.as_deref())?;
    let mut output = open_output(args.output.as_deref(), global.force)?;

    let mut decoder = DeltaDecoder::new(&dictionary, input, opts);
    let total = decoder
        .decode_to(&mut output)
        .map_err(|e| format!("decode error: {e}"))?;
    output.flush().map_err(|e| format!("write flush error: {e}"))?;

    if global.verbose > 0 && !global.quiet {
        eprintln!(
            "vcdelta: decoder: output size: {total}, windows: {}",
            decoder.windows_decoded()
        );
    }
    if global.json_output {
        emit_json(&serde_json::json!({
            "command": "decode",
            "output_size": total,
            "windows": decoder.windows_decoded(),
        }));
    }
    Ok(())
}

fn cmd_info(args: &InfoArgs, global: &Global) -> Result<(), String> {
    let mut input = open_input(args.input.as_deref())?;
    let file_hdr = FileHeader::decode(&mut input).map_err(|e| format!("header: {e}"))?;

    let mut windows = Vec::new();
    let mut target_total = 0u64;
    while let Some(hdr) = WindowHeader::decode(&mut input).map_err(|e| format!("window {}: {e}", windows.len()))? {
        let body = hdr.body_len();
        let skipped = io::copy(&mut (&mut input).take(body), &mut io::sink())
            .map_err(|e| format!("read error: {e}"))?;
        if skipped < body {
            return Err(format!("window {}: truncated body", windows.len()));
        }
        target_total += hdr.target_window_len;
        windows.push(hdr);
    }

    if global.json_output {
        let list: Vec<_> = windows
            .iter()
            .map(|w| {
                serde_json::json!({
                    "source_len": w.source_segment.map(|s| s.len),
                    "source_pos": w.source_segment.map(|s| s.pos),
                    "target_len": w.target_window_len,
                    "data_len": w.data_len,
                    "inst_len": w.inst_len,
                    "addr_len": w.addr_len,
                    "adler32": w.adler32,
                })
            })
            .collect();
        println!(
            "{:#}",
            serde_json::json!({
                "format": format!("{:?}", file_hdr.format),
                "windows": list,
                "target_size": target_total,
            })
        );
        return Ok(());
    }

    println!("VCDIFF format:          {:?}", file_hdr.format);
    println!("VCDIFF windows:         {}", windows.len());
    println!("target size:            {target_total}");
    if global.quiet {
        return Ok(());
    }
    for (i, w) in windows.iter().enumerate() {
        println!();
        println!("window {i}:");
        if let Some(seg) = w.source_segment {
            println!("  source segment:       {} bytes at {}", seg.len, seg.pos);
        }
        println!("  target window length: {}", w.target_window_len);
        println!("  data section length:  {}", w.data_len);
        println!("  inst section length:  {}", w.inst_len);
        println!("  addr section length:  {}", w.addr_len);
        if let Some(sum) = w.adler32 {
            println!("  adler32:              {sum:08x}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let global = Global {
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose,
        json_output: cli.json_output,
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(&global)))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let result = match &cli.command {
        Cmd::Encode(args) => cmd_encode(args, &global),
        Cmd::Decode(args) => cmd_decode(args, &global),
        Cmd::Info(args) => cmd_info(args, &global),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("vcdelta: {e}");
            process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
