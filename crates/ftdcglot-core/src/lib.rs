//! ftdcglot-core — MongoDB FTDC (`diagnostic.data`) decoding and analytics.
//!
//! Decode pipeline, one buffer at a time:
//! - `envelope` — top-level BSON document framing, metadata vs. chunk
//! - `chunk` — zlib inflate and metric block layout
//! - `flatten` — reference document → ordered metric paths
//! - `delta` — varint / zero-run delta stream → per-path series
//! - `decode` — the above glued together, with a block error policy
//!
//! Records and aggregation:
//! - `bson` — minimal BSON reader
//! - `model` — structured server-status / system-metrics / replica-set records
//! - `reassemble` — decoded series → structured records
//! - `diagnostic` — directory scanning and parallel file loading
//! - `stats` — windowed text summaries
//!
//! With `grafana` feature (default):
//! - `timeseries` — chart series, range filtering, downsampling
//! - `grafana` — JSON datasource search / query backend

pub mod bson;
pub mod chunk;
pub mod decode;
pub mod delta;
pub mod diagnostic;
pub mod envelope;
pub mod error;
pub mod flatten;
pub mod model;
pub mod reassemble;
pub mod stats;

#[cfg(feature = "grafana")]
pub mod grafana;

#[cfg(feature = "grafana")]
pub mod timeseries;

#[cfg(test)]
mod testing;

pub use error::{FtdcError, Result};

/// Crate version with the short git SHA it was built from.
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_SHA"));

/// Target triple the binaries were compiled for.
pub const BUILD_TARGET: &str = env!("FTDCGLOT_BUILD_TARGET");
