//! ftdcglot - MongoDB FTDC stats printer.
//!
//! Decodes `diagnostic.data` captures and prints windowed summaries.
//!
//! Usage:
//!   ftdcglot ./diagnostic.data              # auto span (duration / 20)
//!   ftdcglot --span 600 ./diagnostic.data   # 10 minute windows
//!   ftdcglot --latest 3 ./diagnostic.data   # newest 3 files only

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;

use clap::Parser;
use tracing::{Level, error, warn};
use tracing_subscriber::EnvFilter;

use ftdcglot_core::decode::DecodeOptions;
use ftdcglot_core::diagnostic::{DiagnosticData, LoadOptions};
use ftdcglot_core::stats::{Span, print_all_stats};

/// MongoDB FTDC stats printer.
#[derive(Parser)]
#[command(name = "ftdcglot", about = "MongoDB FTDC stats printer", version = ftdcglot_core::VERSION)]
struct Args {
    /// diagnostic.data directories or metrics.* files.
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,

    /// Window length in seconds, or "auto".
    #[arg(long, default_value = "auto", env = "FTDCGLOT_SPAN")]
    span: Span,

    /// Only read the newest N files (0 = all).
    #[arg(long, default_value = "0")]
    latest: usize,

    /// Fail on the first corrupt block instead of skipping it.
    #[arg(long)]
    strict: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is warn.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let mut filter = EnvFilter::from_default_env();
    for target in ["ftdcglot", "ftdcglot_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let opts = LoadOptions {
        latest: args.latest,
        decode: if args.strict {
            DecodeOptions::strict()
        } else {
            DecodeOptions::default()
        },
    };
    let diag = match DiagnosticData::load(&args.paths, &opts) {
        Ok(diag) => diag,
        Err(e) => {
            error!(error = %e, "failed to load diagnostic data");
            std::process::exit(1);
        }
    };
    if args.strict && !diag.warnings.is_empty() {
        for w in &diag.warnings {
            eprintln!("Error: {}: {}", w.path.display(), w.error);
        }
        std::process::exit(1);
    }
    if diag.discarded_blocks > 0 {
        warn!(blocks = diag.discarded_blocks, "corrupt blocks were skipped");
    }

    if let Some(ref info) = diag.server_info {
        println!("{}", info.summary());
    }
    match diag.time_range() {
        Some((from, to)) => println!(
            "Stats from {} to {}",
            from.format("%Y-%m-%dT%H:%M:%SZ"),
            to.format("%Y-%m-%dT%H:%M:%SZ")
        ),
        None => {
            eprintln!("No serverStatus samples found");
            std::process::exit(1);
        }
    }
    println!();
    print!("{}", print_all_stats(&diag.server_status, args.span));
}
