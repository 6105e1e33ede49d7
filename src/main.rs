use clap::Parser;
use logcheck::check::{check_archive, CheckOptions};
use logcheck::format::{LogFormat, OffsetWidth};
use logcheck::report::render_index;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "logcheck",
    version,
    about = "Check the structural integrity of a performance archive",
    long_about = "Validates record framing in every file of the archive (pass 0), \
                  then the ordering and offset bounds of the temporal index (pass 1). \
                  The archive is never modified."
)]
struct Cli {
    /// Archive base name, or any of <base>.meta, <base>.index, <base>.<N>
    archive: PathBuf,
    /// Report progress of each pass on stderr
    #[arg(short, long)]
    verbose: bool,
    /// Only log errors on stderr
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
    /// Width in bits of the offsets stored in index entries (32 or 64)
    #[arg(long, default_value = "32", value_parser = parse_width)]
    offset_width: OffsetWidth,
    /// Print the recovered temporal index after the findings (with --json,
    /// as a `temporal_index` array)
    #[arg(short = 't', long)]
    dump_index: bool,
    /// Render the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };
    init_tracing(&cli);

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("logcheck: {e}");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let options = CheckOptions {
        format:     LogFormat { offset_width: cli.offset_width, ..LogFormat::V2 },
        dump_index: cli.dump_index,
    };
    let outcome = check_archive(&cli.archive, &options)?;

    let mut out = io::stdout().lock();
    if cli.json {
        outcome.report.render_json(&mut out, &outcome.entries)?;
    } else {
        outcome.report.render_text(&mut out)?;
        if cli.dump_index {
            render_index(&mut out, &outcome.archive.name.index_path(), &outcome.entries)?;
        }
    }
    out.flush()?;

    if cli.verbose {
        eprintln!("{}", outcome.report.summary());
    }
    Ok(outcome.report.exit_code())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_width(s: &str) -> Result<OffsetWidth, String> {
    s.parse::<u32>()
        .ok()
        .and_then(OffsetWidth::from_bits)
        .ok_or_else(|| format!("unsupported offset width '{s}', expected 32 or 64"))
}

/// `LOGCHECK_LOG`, then `RUST_LOG`, then the `-v`/`-q` flags; default `warn`.
fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::WARN
    };
    let filter = std::env::var("LOGCHECK_LOG")
        .ok()
        .and_then(|d| EnvFilter::try_new(d).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .without_time()
                .compact(),
        )
        .init();
}
