use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use memtrace::io_utils::{cli_hint, io_cli_error, simple_cli_error, trace_cli_error, CliError};
use memtrace::{
    add_rowclone_info, check_records, cpu_paths, dump_log, dump_writer, filter_misses,
    merge_logs, Cache, CacheConfig, CheckOptions, LogReader, LogRecord, LogWriter,
    ReaderConfig, RowcloneConfig,
};

/// Post-process emulator memory-access trace logs.
#[derive(Parser)]
#[command(name = "memtrace", version, about)]
struct Cli {
    /// Only log warnings and errors (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Flag records whose instruction count is lower than the previous one
    Check(CheckArgs),
    /// Merge per-CPU logs into one log ordered by instruction count
    Merge(MergeArgs),
    /// Print a binary log as comma separated text
    Dump(DumpArgs),
    /// Keep only the accesses of a text trace that miss a simulated cache
    Cache(CacheArgs),
    /// Collapse kernel copies found in a log into rowclone records
    Rowclone(RowcloneArgs),
}

#[derive(Args)]
struct ReadArgs {
    /// Records read per batch
    #[arg(long, default_value_t = ReaderConfig::default().batch_size)]
    batch_size: usize,
    /// Show a progress bar on stderr
    #[arg(long)]
    progress: bool,
}

impl ReadArgs {
    fn config(&self) -> ReaderConfig {
        ReaderConfig {
            batch_size: self.batch_size,
        }
    }
}

#[derive(Args)]
struct CheckArgs {
    /// Binary trace log
    #[arg(default_value = "logs/firefox/merged.log")]
    log: PathBuf,
    /// Stop after this many out of order records
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_violations: Option<u64>,
    /// Print a JSON report instead of each violation
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    read: ReadArgs,
}

#[derive(Args)]
struct MergeArgs {
    /// Per-CPU input logs
    inputs: Vec<PathBuf>,
    /// Input path pattern with a {cpu} placeholder, used instead of INPUTS
    #[arg(long, conflicts_with = "inputs")]
    pattern: Option<String>,
    /// Number of CPUs expanded from --pattern
    #[arg(long, default_value_t = 8)]
    cpus: usize,
    /// Merged output log
    #[arg(short, long)]
    output: PathBuf,
    /// Print a JSON report
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    read: ReadArgs,
}

#[derive(Args)]
struct DumpArgs {
    /// Binary trace log
    log: PathBuf,
    /// Stop after this many records
    #[arg(long)]
    limit: Option<u64>,
    /// Write to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[command(flatten)]
    read: ReadArgs,
}

#[derive(Args)]
struct CacheArgs {
    /// Text access trace
    input: PathBuf,
    /// Miss trace output
    #[arg(short, long)]
    output: PathBuf,
    /// Cache capacity in bytes
    #[arg(long, default_value_t = CacheConfig::default().size)]
    size: usize,
    /// Cache line size in bytes
    #[arg(long, default_value_t = CacheConfig::default().block_size)]
    block_size: usize,
    /// Ways per set
    #[arg(long, default_value_t = CacheConfig::default().associativity)]
    associativity: usize,
    /// Print a JSON report
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RowcloneArgs {
    /// Binary trace log
    log: PathBuf,
    /// Kernel copy log
    #[arg(long)]
    kernel_log: PathBuf,
    /// Text access trace output
    #[arg(short, long)]
    output: PathBuf,
    /// Kernel copy events kept in the matching window
    #[arg(long, default_value_t = RowcloneConfig::default().window)]
    window: usize,
    /// Newer matches tolerated before a window entry is dropped
    #[arg(long, default_value_t = RowcloneConfig::default().stale_threshold)]
    stale_threshold: usize,
    /// Bytes of loads and stores needed to accept a copy
    #[arg(long, default_value_t = RowcloneConfig::default().confidence_bytes)]
    confidence_bytes: u64,
    /// Print a JSON report
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    read: ReadArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "memtrace=warn" } else { "memtrace=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(command: Command) -> Result<ExitCode, CliError> {
    match command {
        Command::Check(args) => run_check(args),
        Command::Merge(args) => run_merge(args).map(|_| ExitCode::SUCCESS),
        Command::Dump(args) => run_dump(args).map(|_| ExitCode::SUCCESS),
        Command::Cache(args) => run_cache(args).map(|_| ExitCode::SUCCESS),
        Command::Rowclone(args) => run_rowclone(args).map(|_| ExitCode::SUCCESS),
    }
}

fn open_log(path: &Path, read: &ReadArgs) -> Result<LogReader<File>, CliError> {
    LogReader::open_with(path, &read.config())
        .map_err(|e| trace_cli_error("opening log", path, e))
}

/// Progress bar sized in records, hidden unless requested.
fn progress_bar(path: &Path, read: &ReadArgs) -> ProgressBar {
    if !read.progress {
        return ProgressBar::hidden();
    }
    let records = fs::metadata(path)
        .map(|m| m.len() / LogRecord::SIZE as u64)
        .unwrap_or(0);
    let pb = ProgressBar::new(records);
    if let Ok(style) =
        ProgressStyle::with_template("{bar:40} {pos}/{len} records ({per_sec}, eta {eta})")
    {
        pb.set_style(style);
    }
    pb
}

fn create_output(path: &Path) -> Result<BufWriter<File>, CliError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| io_cli_error("creating output file", path, e))
}

fn print_json<T: Serialize>(report: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(report)
        .map_err(|e| simple_cli_error(&format!("failed to encode report: {e}")))?;
    println!("{text}");
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<ExitCode, CliError> {
    let reader = open_log(&args.log, &args.read)?;
    let pb = progress_bar(&args.log, &args.read);
    let options = CheckOptions {
        max_violations: args.max_violations,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut write_err = None;
    let report = check_records(pb.wrap_iter(reader), &options, |v| {
        if !args.json && write_err.is_none() {
            if let Err(e) = writeln!(out, "{v}") {
                write_err = Some(e);
            }
        }
    })
    .map_err(|e| trace_cli_error("reading log", &args.log, e))?;
    pb.finish_and_clear();
    if let Some(e) = write_err {
        return Err(io_cli_error("writing report", Path::new("<stdout>"), e));
    }
    drop(out);

    tracing::info!(
        records = report.records,
        violations = report.violations,
        "check complete"
    );
    if args.json {
        print_json(&report)?;
    }
    Ok(if report.is_monotonic() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn run_merge(args: MergeArgs) -> Result<(), CliError> {
    let paths: Vec<PathBuf> = match &args.pattern {
        Some(pattern) => cpu_paths(pattern, args.cpus)
            .map_err(|e| simple_cli_error(&cli_hint(&e)))?
            .into_iter()
            .map(PathBuf::from)
            .collect(),
        None => args.inputs.clone(),
    };
    if paths.is_empty() {
        return Err(simple_cli_error("no input logs given; pass INPUTS or --pattern"));
    }

    let readers = paths
        .iter()
        .map(|p| open_log(p, &args.read))
        .collect::<Result<Vec<_>, _>>()?;
    let mut writer = LogWriter::create(&args.output)
        .map_err(|e| trace_cli_error("creating output file", &args.output, e))?;

    tracing::info!(inputs = paths.len(), output = %args.output.display(), "merging logs");
    let report = merge_logs(readers, &mut writer)
        .map_err(|e| trace_cli_error("merging into", &args.output, e))?;
    writer
        .finish()
        .map_err(|e| trace_cli_error("writing output file", &args.output, e))?;

    if args.json {
        print_json(&report)?;
    }
    Ok(())
}

fn run_dump(args: DumpArgs) -> Result<(), CliError> {
    let reader = open_log(&args.log, &args.read)?;
    let pb = progress_bar(&args.log, &args.read);
    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(create_output(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut csv = dump_writer(sink);
    let rows = dump_log(pb.wrap_iter(reader), &mut csv, args.limit)
        .map_err(|e| trace_cli_error("dumping log", &args.log, e))?;
    pb.finish_and_clear();
    tracing::debug!(rows, "dump complete");
    Ok(())
}

fn run_cache(args: CacheArgs) -> Result<(), CliError> {
    let config = CacheConfig {
        size: args.size,
        block_size: args.block_size,
        associativity: args.associativity,
    };
    let mut cache = Cache::from_config(&config)
        .map_err(|e| simple_cli_error(&cli_hint(&e)))?;
    let input = BufReader::new(
        File::open(&args.input).map_err(|e| io_cli_error("opening trace", &args.input, e))?,
    );
    let mut out = create_output(&args.output)?;

    let report = filter_misses(input, &mut cache, &mut out)
        .map_err(|e| trace_cli_error("filtering trace", &args.input, e))?;
    tracing::info!(
        accesses = report.accesses,
        hits = report.hits,
        misses = report.misses,
        rowclones = report.rowclones,
        skipped = report.skipped,
        "cache filter complete"
    );
    if args.json {
        print_json(&report)?;
    }
    Ok(())
}

fn run_rowclone(args: RowcloneArgs) -> Result<(), CliError> {
    let reader = open_log(&args.log, &args.read)?;
    let pb = progress_bar(&args.log, &args.read);
    let kernel = File::open(&args.kernel_log)
        .map_err(|e| io_cli_error("opening kernel log", &args.kernel_log, e))?;
    let config = RowcloneConfig {
        window: args.window,
        stale_threshold: args.stale_threshold,
        confidence_bytes: args.confidence_bytes,
    };
    let mut out = create_output(&args.output)?;

    let report = add_rowclone_info(
        pb.wrap_iter(reader),
        BufReader::new(kernel).lines(),
        config,
        &mut out,
    )
    .map_err(|e| trace_cli_error("matching copies in", &args.log, e))?;
    pb.finish_and_clear();

    if args.json {
        print_json(&report)?;
    }
    Ok(())
}
