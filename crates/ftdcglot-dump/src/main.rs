use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;

use ftdcglot_core::decode::decode_block;
use ftdcglot_core::delta::DecodedBlock;
use ftdcglot_core::diagnostic::{metrics_filenames, parse_file_time};
use ftdcglot_core::envelope::{Envelope, EnvelopeReader};
use ftdcglot_core::flatten::SkippedLeaf;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "ftdcglot-dump",
    about = "Inspect the envelope and block layout of FTDC metrics files",
    version = ftdcglot_core::VERSION
)]
struct Cli {
    /// metrics.* file or diagnostic.data directory
    path: Option<PathBuf>,

    /// List every metric path of each block
    #[arg(long)]
    paths: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let path = cli.path.clone().unwrap_or_else(|| PathBuf::from("."));

    let files = metrics_filenames(&[&path]);
    if files.is_empty() {
        eprintln!("No metrics.* files under {}", path.display());
        std::process::exit(1);
    }

    let dumps: Vec<FileJson> = files.iter().map(|f| dump_file(f, &cli)).collect();
    if cli.json {
        match serde_json::to_string_pretty(&dumps) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error encoding JSON: {e}");
                std::process::exit(1);
            }
        }
    } else {
        for dump in &dumps {
            print_file(dump, &cli);
        }
    }
}

// ── Formatting helpers ───────────────────────────────────────────────────────

fn human_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn fmt_ms(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

// ── JSON output types ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FileJson {
    file: String,
    file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_time: Option<String>,
    documents: Vec<DocumentJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum DocumentJson {
    Metadata {
        keys: Vec<String>,
    },
    Chunk {
        offset: usize,
        compressed_bytes: usize,
        #[serde(flatten)]
        block: Option<BlockJson>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Unknown {
        offset: usize,
        type_code: Option<i32>,
    },
}

#[derive(Serialize)]
struct BlockJson {
    num_attribs: usize,
    num_deltas: u32,
    samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last: Option<String>,
    skipped: Vec<SkippedLeaf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    paths: Option<Vec<String>>,
}

fn block_json(block: &DecodedBlock, with_paths: bool) -> BlockJson {
    let start = block.series_for("start");
    BlockJson {
        num_attribs: block.num_attribs(),
        num_deltas: block.num_deltas,
        samples: block.sample_count(),
        first: start.and_then(|s| s.first()).map(|ms| fmt_ms(*ms)),
        last: start.and_then(|s| s.last()).map(|ms| fmt_ms(*ms)),
        skipped: block.skipped.clone(),
        paths: with_paths.then(|| block.paths.clone()),
    }
}

// ── dump_file ────────────────────────────────────────────────────────────────

fn dump_file(path: &Path, cli: &Cli) -> FileJson {
    let fname = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();
    let mut out = FileJson {
        file_time: parse_file_time(&fname).map(|t| t.to_rfc3339()),
        file: fname,
        file_size: 0,
        documents: Vec::new(),
        error: None,
    };
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            out.error = Some(e.to_string());
            return out;
        }
    };
    out.file_size = data.len() as u64;

    for envelope in EnvelopeReader::new(&data) {
        let envelope = match envelope {
            Ok(envelope) => envelope,
            Err(e) => {
                out.error = Some(e.to_string());
                break;
            }
        };
        let doc = match envelope {
            Envelope::Metadata(meta) => DocumentJson::Metadata {
                keys: meta.iter().map(|(k, _)| k.to_string()).collect(),
            },
            Envelope::Chunk { offset, data } => match decode_block(&data, offset) {
                Ok(block) => DocumentJson::Chunk {
                    offset,
                    compressed_bytes: data.len(),
                    block: Some(block_json(&block, cli.paths)),
                    error: None,
                },
                Err(e) => DocumentJson::Chunk {
                    offset,
                    compressed_bytes: data.len(),
                    block: None,
                    error: Some(e.to_string()),
                },
            },
            Envelope::Unknown { offset, kind } => DocumentJson::Unknown {
                offset,
                type_code: kind,
            },
        };
        out.documents.push(doc);
    }
    out
}

fn print_file(dump: &FileJson, cli: &Cli) {
    println!("File: {} ({})", dump.file, human_bytes(dump.file_size));
    if let Some(ref t) = dump.file_time {
        println!("Started: {t}");
    }
    let chunks = dump
        .documents
        .iter()
        .filter(|d| matches!(d, DocumentJson::Chunk { .. }))
        .count();
    println!("Documents: {} ({} chunks)", dump.documents.len(), chunks);
    println!("  {}", "─".repeat(72));

    for doc in &dump.documents {
        match doc {
            DocumentJson::Metadata { keys } => {
                println!("  metadata   {}", keys.join(", "));
            }
            DocumentJson::Chunk {
                offset,
                compressed_bytes,
                block: Some(block),
                ..
            } => {
                println!(
                    "  chunk @{:<10} {:>10}  attribs {:>5}  deltas {:>4}  {} .. {}",
                    offset,
                    human_bytes(*compressed_bytes as u64),
                    block.num_attribs,
                    block.num_deltas,
                    block.first.as_deref().unwrap_or("-"),
                    block.last.as_deref().unwrap_or("-"),
                );
                for leaf in &block.skipped {
                    println!("      skipped {} ({})", leaf.path, leaf.kind);
                }
                if cli.paths
                    && let Some(ref paths) = block.paths
                {
                    for p in paths {
                        println!("      {p}");
                    }
                }
            }
            DocumentJson::Chunk { offset, error, .. } => {
                println!(
                    "  chunk @{:<10} ERROR {}",
                    offset,
                    error.as_deref().unwrap_or("unknown")
                );
            }
            DocumentJson::Unknown { offset, type_code } => {
                println!("  unknown @{offset} type {type_code:?}");
            }
        }
    }
    if let Some(ref e) = dump.error {
        println!("  ERROR {e}");
    }
    println!();
}
