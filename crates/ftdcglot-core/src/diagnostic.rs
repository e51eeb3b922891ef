//! Loading `diagnostic.data` directories and `metrics.*` files.
//!
//! Each file is an independent capture buffer, so files are decoded in
//! parallel and concatenated in file-name order afterwards. File names embed
//! the capture start time (`metrics.2017-10-12T20-08-53Z-00000`), which makes
//! name order equal to time order.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use crate::decode::{DecodeOptions, decode_buffer};
use crate::error::{FtdcError, Result};
use crate::model::{ReplSetStatus, ServerInfo, ServerStatus, SystemMetrics};
use crate::reassemble::Attribs;

/// File name prefix of every capture file.
pub const METRICS_PREFIX: &str = "metrics.";
const FILE_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";

/// Expands `paths` into capture files sorted by file name.
///
/// Directories contribute their `metrics.*` regular files; explicit files are
/// kept when their base name starts with `metrics.`. Paths that cannot be
/// read are skipped.
pub fn metrics_filenames<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let Ok(meta) = fs::metadata(path) else {
            debug!("skipping unreadable path {}", path.display());
            continue;
        };
        if meta.is_dir() {
            let Ok(entries) = fs::read_dir(path) else {
                continue;
            };
            for entry in entries.flatten() {
                let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                if is_file && is_metrics_file(&entry.path()) {
                    files.push(entry.path());
                }
            }
        } else if meta.is_file() && is_metrics_file(path) {
            files.push(path.to_path_buf());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

fn is_metrics_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(METRICS_PREFIX))
}

/// Capture start time encoded in a `metrics.<time>-<seq>` file name.
pub fn parse_file_time(name: &str) -> Option<DateTime<Utc>> {
    let start = name.find(METRICS_PREFIX)? + METRICS_PREFIX.len();
    let end = name.rfind('-')?;
    if end < start {
        return None;
    }
    NaiveDateTime::parse_from_str(&name[start..end], FILE_TIME_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

/// Loader configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadOptions {
    /// Keep only the last N files (0 = all).
    pub latest: usize,
    pub decode: DecodeOptions,
}

/// A file that could not be decoded; loading went on without it.
#[derive(Debug)]
pub struct FileWarning {
    pub path: PathBuf,
    pub error: FtdcError,
}

/// Decoded content of one file.
#[derive(Default)]
struct FileData {
    server_info: Option<ServerInfo>,
    server_status: Vec<ServerStatus>,
    system_metrics: Vec<SystemMetrics>,
    repl_set_status: Vec<ReplSetStatus>,
    discarded_blocks: usize,
}

fn load_file(path: &Path, opts: &DecodeOptions) -> Result<FileData> {
    let started = Instant::now();
    let buf = fs::read(path)?;
    let capture = decode_buffer(&buf, opts)?;

    let mut data = FileData {
        server_info: capture.metadata.as_ref().map(ServerInfo::from_metadata),
        discarded_blocks: capture.discarded.len(),
        ..Default::default()
    };
    data.server_status.reserve(capture.sample_count());
    data.system_metrics.reserve(capture.sample_count());
    for block in &capture.blocks {
        if let Some(status) = &block.repl_set {
            data.repl_set_status.push(status.clone());
        }
        for (ss, sm) in Attribs::new(block).samples() {
            data.server_status.push(ss);
            data.system_metrics.push(sm);
        }
    }
    debug!(
        file = %path.display(),
        blocks = capture.blocks.len(),
        samples = data.server_status.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "diagnostic: file decoded"
    );
    Ok(data)
}

/// Decodes `files` on up to `available_parallelism - 1` scoped threads.
/// Results come back in input order.
fn load_parallel(files: &[PathBuf], opts: &DecodeOptions) -> Vec<Result<FileData>> {
    let workers = thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .clamp(1, files.len().max(1));
    let per_worker = files.len().div_ceil(workers).max(1);

    thread::scope(|scope| {
        let handles: Vec<_> = files
            .chunks(per_worker)
            .map(|part| {
                scope.spawn(move || {
                    part.iter()
                        .map(|path| load_file(path, opts))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut results = Vec::with_capacity(files.len());
        for (handle, part) in handles.into_iter().zip(files.chunks(per_worker)) {
            match handle.join() {
                Ok(part_results) => results.extend(part_results),
                Err(_) => results.extend(part.iter().map(|_| {
                    Err(FtdcError::Io(std::io::Error::other("decoder thread panicked")))
                })),
            }
        }
        results
    })
}

/// All records decoded from a set of capture files.
#[derive(Debug, Default)]
pub struct DiagnosticData {
    pub server_info: Option<ServerInfo>,
    pub server_status: Vec<ServerStatus>,
    pub system_metrics: Vec<SystemMetrics>,
    /// One entry per block that carried `replSetGetStatus`.
    pub repl_set_status: Vec<ReplSetStatus>,
    /// Files that contributed, in load order.
    pub files: Vec<PathBuf>,
    pub warnings: Vec<FileWarning>,
    /// Blocks dropped under the skip policy, summed over all files.
    pub discarded_blocks: usize,
}

impl DiagnosticData {
    /// Loads every capture file found under `paths`.
    ///
    /// A file that fails to decode is reported in `warnings` and the rest are
    /// still loaded. Fails only when no capture file is found at all.
    pub fn load<P: AsRef<Path>>(paths: &[P], opts: &LoadOptions) -> Result<Self> {
        let mut files = metrics_filenames(paths);
        if files.is_empty() {
            return Err(FtdcError::NoData("no metrics.* files found".into()));
        }
        if opts.latest > 0 && opts.latest < files.len() {
            files.drain(..files.len() - opts.latest);
        }

        let started = Instant::now();
        info!("reading {} file(s)", files.len());
        let results = load_parallel(&files, &opts.decode);

        let mut diag = DiagnosticData::default();
        for (path, result) in files.into_iter().zip(results) {
            match result {
                Ok(data) => {
                    if data.server_info.is_some() {
                        diag.server_info = data.server_info;
                    }
                    diag.server_status.extend(data.server_status);
                    diag.system_metrics.extend(data.system_metrics);
                    diag.repl_set_status.extend(data.repl_set_status);
                    diag.discarded_blocks += data.discarded_blocks;
                    diag.files.push(path);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "diagnostic: file skipped");
                    diag.warnings.push(FileWarning { path, error: e });
                }
            }
        }
        info!(
            files = diag.files.len(),
            samples = diag.server_status.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "diagnostic: load complete"
        );
        Ok(diag)
    }

    pub fn is_empty(&self) -> bool {
        self.server_status.is_empty()
    }

    /// First and last sample time.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.server_status.first()?;
        let last = self.server_status.last()?;
        Some((first.local_time, last.local_time))
    }
}
