// Command-line front end for tardelta.
//
// Subcommands:
//   scan     list the inventory of one archive
//   analyze  pair every file of a new archive with a reuse plan
//   config   print the chunking and selection constants
//
// Listings go to stdout; `--json` stats and diagnostics go to stderr.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::analysis::{AnalysisOptions, DeltaAnalysis, MatchKind};
use crate::archive::ArchiveInventory;
use crate::hash::config;
use crate::io::{AnalysisStats, analyze_files, scan_file};

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Delta analysis between two versions of a tar archive.
#[derive(Parser, Debug)]
#[command(
    name = "tardelta",
    version,
    about = "Tar archive delta analysis",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List the usable files of an archive.
    Scan(ScanArgs),
    /// Analyse the delta between an old and a new archive.
    Analyze(AnalyzeArgs),
    /// Print chunking and selection parameters.
    Config,
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Archive to scan (.tar or .tar.gz).
    #[arg(value_hint = ValueHint::FilePath)]
    archive: PathBuf,

    /// Also list every chunk.
    #[arg(long)]
    chunks: bool,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Old archive version.
    #[arg(value_hint = ValueHint::FilePath)]
    old: PathBuf,

    /// New archive version.
    #[arg(value_hint = ValueHint::FilePath)]
    new: PathBuf,

    /// Directory for the scratch file (default: system temp dir).
    #[arg(long = "scratch-dir", value_hint = ValueHint::DirPath)]
    scratch_dir: Option<PathBuf>,

    /// Size tolerance for similar-file candidates, in percent.
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=100), default_value_t = config::SIMILARITY_PERCENT)]
    similarity: u64,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Scan { archive: PathBuf, chunks: bool },
    Analyze { old: PathBuf, new: PathBuf },
    Config,
}

struct Options {
    command: Command,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    analysis: AnalysisOptions,
}

fn resolve_options(cli: Cli) -> Options {
    let mut analysis = AnalysisOptions::default();
    let command = match cli.command {
        Cmd::Scan(args) => Command::Scan {
            archive: args.archive,
            chunks: args.chunks,
        },
        Cmd::Analyze(args) => {
            analysis.scratch_dir = args.scratch_dir;
            analysis.similarity_percent = args.similarity;
            Command::Analyze {
                old: args.old,
                new: args.new,
            }
        }
        Cmd::Config => Command::Config,
    };
    Options {
        command,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        analysis,
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) -> Option<AnalysisOptions> {
    let argv: Vec<String> = std::iter::once("tardelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    let opts = resolve_options(Cli::try_parse_from(argv).ok()?);
    let _ = log_filter(&opts);
    Some(opts.analysis)
}

fn log_filter(opts: &Options) -> &'static str {
    match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    }
}

// ---------------------------------------------------------------------------
// Scan command
// ---------------------------------------------------------------------------

fn cmd_scan(opts: &Options, archive: &Path, chunks: bool) -> i32 {
    let inventory = match scan_file(archive) {
        Ok(inv) => inv,
        Err(e) => {
            eprintln!("tardelta: {}: {e}", archive.display());
            return 1;
        }
    };

    if !opts.quiet {
        let mut out = BufWriter::new(io::stdout().lock());
        if let Err(e) = write_inventory(&mut out, &inventory, chunks) {
            eprintln!("tardelta: write error: {e}");
            return 1;
        }
    }

    if opts.json_output {
        let chunk_count: usize = inventory.files().iter().map(|f| f.chunks.len()).sum();
        let json = serde_json::json!({
            "command": "scan",
            "archive_size": std::fs::metadata(archive).map(|m| m.len()).unwrap_or(0),
            "files": inventory.len(),
            "total_size": inventory.total_size(),
            "chunks": chunk_count,
        });
        print_json(&json);
    }

    0
}

fn write_inventory<W: Write>(out: &mut W, inv: &ArchiveInventory, chunks: bool) -> io::Result<()> {
    for f in inv.files() {
        let flags = format!(
            "{}{}",
            if f.world_readable { 'r' } else { '-' },
            if f.is_executable { 'x' } else { '-' }
        );
        writeln!(
            out,
            "{:>6} {:>12} {} {flags} {}",
            f.index,
            f.size,
            f.digest_hex(),
            f.path
        )?;
        if chunks {
            for c in &f.chunks {
                writeln!(
                    out,
                    "{:>6} {:>12} {} +{}",
                    "",
                    c.offset,
                    hex::encode(c.digest),
                    c.size
                )?;
            }
        }
    }
    out.flush()
}

// ---------------------------------------------------------------------------
// Analyze command
// ---------------------------------------------------------------------------

fn cmd_analyze(opts: &Options, old: &Path, new: &Path) -> i32 {
    let (analysis, stats) = match analyze_files(old, new, &opts.analysis) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("tardelta: analyze error: {e}");
            return 1;
        }
    };

    if !opts.quiet {
        let mut out = BufWriter::new(io::stdout().lock());
        if let Err(e) = write_matches(&mut out, &analysis) {
            eprintln!("tardelta: write error: {e}");
            return 1;
        }
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "tardelta: {} identical, {} partial, {} literal; {} bytes reused, {} literal, {} spooled",
            stats.identical,
            stats.partial,
            stats.literal,
            stats.reused_bytes,
            stats.literal_bytes,
            stats.spooled_bytes
        );
    }

    if opts.json_output {
        print_json(&stats_json(&stats));
    }

    if let Err(e) = analysis.close() {
        eprintln!("tardelta: scratch cleanup: {e}");
        return 1;
    }
    0
}

fn write_matches<W: Write>(out: &mut W, analysis: &DeltaAnalysis) -> io::Result<()> {
    for t in analysis.targets() {
        let source = t.source.map(|id| analysis.source(id).file.path.as_str());
        match (t.kind(), source, &t.blocks) {
            (MatchKind::Identical, Some(src), _) => {
                writeln!(out, "identical {} <- {src}", t.file.path)?;
            }
            (MatchKind::Partial, Some(src), Some(blocks)) => {
                writeln!(
                    out,
                    "partial   {} <- {src} ({}/{} bytes matched)",
                    t.file.path,
                    blocks.matched_bytes(),
                    t.file.size
                )?;
            }
            _ => writeln!(out, "literal   {}", t.file.path)?,
        }
    }
    out.flush()
}

fn stats_json(stats: &AnalysisStats) -> serde_json::Value {
    serde_json::json!({
        "command": "analyze",
        "old_archive_size": stats.old_archive_size,
        "new_archive_size": stats.new_archive_size,
        "old_files": stats.old_files,
        "new_files": stats.new_files,
        "identical": stats.identical,
        "partial": stats.partial,
        "literal": stats.literal,
        "reused_bytes": stats.reused_bytes,
        "literal_bytes": stats.literal_bytes,
        "spooled_bytes": stats.spooled_bytes,
    })
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    println!("tardelta {}", env!("CARGO_PKG_VERSION"));
    println!("WINDOW_SIZE={}", config::WINDOW_SIZE);
    println!("CHUNK_BITS={}", config::CHUNK_BITS);
    println!("CHUNK_SIZE={}", config::CHUNK_SIZE);
    println!("MAX_CHUNK_SIZE={}", config::MAX_CHUNK_SIZE);
    println!("HEADER_LEN={}", config::HEADER_LEN);
    println!("SIMILARITY_PERCENT={}", config::SIMILARITY_PERCENT);
    println!("NON_DELTA_MARKERS={}", config::NON_DELTA_MARKERS.join(","));
    println!("PARALLEL={}", cfg!(feature = "parallel"));
    0
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => eprintln!("{s}"),
        Err(e) => eprintln!("tardelta: json error: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(&opts)))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match &opts.command {
        Command::Scan { archive, chunks } => cmd_scan(&opts, archive, *chunks),
        Command::Analyze { old, new } => cmd_analyze(&opts, old, new),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
