//! Grafana JSON datasource backend.
//!
//! [`FtdcStats`] holds every loaded sample plus the chart series built from
//! them. The web server owns one instance behind a lock; nothing here is
//! global. Series are rebuilt as a whole whenever new data is merged in.

use std::collections::BTreeMap;
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diagnostic::DiagnosticData;
use crate::model::{ReplSetStatus, ServerInfo, ServerStatus, SystemMetrics};
use crate::timeseries::{
    DISK_TARGETS, DiskStats, REPLICATION_LAGS_TARGET, SeriesMap, TimeSeries, filter_time_series,
    replication_lag_series, server_status_series, short_label, system_metrics_series,
    wiredtiger_series,
};

/// Table target describing the host.
pub const HOST_INFO_TARGET: &str = "host_info";

const ANALYTICS_ENDPOINT: &str = "/d/simagix-grafana/mongodb-mongo-ftdc";
const DISKS_ENDPOINT: &str = "/d/simagix-grafana-disks/mongodb-disks-stats";

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct QueryRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct QueryTarget {
    pub target: String,
    #[serde(rename = "refId", default)]
    pub ref_id: String,
    /// `timeserie` or `table`.
    #[serde(rename = "type", default = "default_target_type")]
    pub target_type: String,
}

fn default_target_type() -> String {
    "timeserie".to_string()
}

/// Body of `POST /grafana/query`.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct QueryRequest {
    #[serde(default)]
    pub timezone: String,
    pub range: QueryRange,
    #[serde(default)]
    pub targets: Vec<QueryTarget>,
}

#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct TableColumn {
    pub text: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct Table {
    pub columns: Vec<TableColumn>,
    #[serde(rename = "type")]
    pub table_type: &'static str,
    pub rows: Vec<Vec<String>>,
}

/// One element of a query answer.
#[derive(Clone, Serialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum QueryResult {
    Series(TimeSeries),
    Table(Table),
}

// ---------------------------------------------------------------------------
// FtdcStats
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct FtdcStats {
    pub server_info: ServerInfo,
    pub server_status: Vec<ServerStatus>,
    pub system_metrics: Vec<SystemMetrics>,
    pub repl_set_status: Vec<ReplSetStatus>,
    series: SeriesMap,
    disks: BTreeMap<String, DiskStats>,
    /// Replication lag per member legend.
    lags: SeriesMap,
    /// Adds the hostname row to the `host_info` table.
    pub show_hostname: bool,
}

impl FtdcStats {
    pub fn from_diagnostic(diag: DiagnosticData) -> Self {
        let mut stats = Self::default();
        stats.merge(diag);
        stats
    }

    /// Appends samples newer than the last one already held, then rebuilds
    /// all series.
    pub fn merge(&mut self, diag: DiagnosticData) {
        let DiagnosticData {
            server_info,
            mut server_status,
            mut system_metrics,
            mut repl_set_status,
            ..
        } = diag;
        if let Some(info) = server_info {
            self.server_info = info;
        }

        server_status.sort_by_key(|s| s.local_time);
        let last = self.server_status.last().map(|s| s.local_time);
        let before = self.server_status.len();
        self.server_status.extend(
            server_status
                .into_iter()
                .filter(|s| last.is_none_or(|t| s.local_time > t)),
        );

        system_metrics.sort_by_key(|m| m.start);
        let last = self.system_metrics.last().map(|m| m.start);
        self.system_metrics.extend(
            system_metrics
                .into_iter()
                .filter(|m| last.is_none_or(|t| m.start > t)),
        );

        repl_set_status.sort_by_key(|r| r.date);
        let last = self.repl_set_status.last().map(|r| r.date);
        self.repl_set_status.extend(
            repl_set_status
                .into_iter()
                .filter(|r| last.is_none_or(|t| r.date > t)),
        );

        debug!(
            added = self.server_status.len() - before,
            total = self.server_status.len(),
            "grafana: samples merged"
        );
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let started = Instant::now();
        let (mut series, wiredtiger, (system, disks), lags) = thread::scope(|s| {
            let ss = s.spawn(|| server_status_series(&self.server_status));
            let wt = s.spawn(|| wiredtiger_series(&self.server_status));
            let rs = s.spawn(|| replication_lag_series(&self.repl_set_status));
            let sm = system_metrics_series(&self.system_metrics);
            (
                ss.join().unwrap_or_default(),
                wt.join().unwrap_or_default(),
                sm,
                rs.join().unwrap_or_default(),
            )
        });
        series.extend(wiredtiger);
        series.extend(system);
        for target in DISK_TARGETS {
            series
                .entry(target.to_string())
                .or_insert_with(|| TimeSeries::new(*target));
        }
        self.series = series;
        self.disks = disks;
        self.lags = lags;
        info!(
            series = self.series.len(),
            disks = self.disks.len(),
            members = self.lags.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "grafana: series rebuilt for {}",
            self.server_info.host_info.system.hostname
        );
    }

    pub fn is_empty(&self) -> bool {
        self.server_status.is_empty()
    }

    pub fn series(&self, target: &str) -> Option<&TimeSeries> {
        self.series.get(target)
    }

    /// Configured WiredTiger cache size in GB, from the first sample.
    pub fn max_wt_cache(&self) -> f64 {
        self.series
            .get("wt_cache_max")
            .and_then(|ts| ts.datapoints.first())
            .map(|p| p[0])
            .unwrap_or(0.0)
    }

    /// Every queryable target name.
    pub fn search(&self) -> Vec<String> {
        let mut list: Vec<String> = self.series.keys().cloned().collect();
        list.push(REPLICATION_LAGS_TARGET.to_string());
        list.extend(
            self.lags
                .keys()
                .map(|member| format!("{}_{}", REPLICATION_LAGS_TARGET, member)),
        );
        list.push(HOST_INFO_TARGET.to_string());
        list
    }

    /// Lag series of one member, addressed as `replication_lags_<member>`.
    fn member_lag(&self, target: &str) -> Option<&TimeSeries> {
        let member = target
            .strip_prefix(REPLICATION_LAGS_TARGET)?
            .strip_prefix('_')?;
        self.lags.get(member)
    }

    pub fn query(&self, req: &QueryRequest) -> Vec<QueryResult> {
        let from = req.range.from.timestamp_millis() as f64;
        let to = req.range.to.timestamp_millis() as f64;
        let mut out = Vec::new();
        for target in &req.targets {
            match target.target_type.as_str() {
                "timeserie" if DISK_TARGETS.contains(&target.target.as_str()) => {
                    for (device, disk) in &self.disks {
                        if let Some(ts) = disk.for_target(&target.target) {
                            let mut filtered = filter_time_series(ts, from, to);
                            filtered.target = device.clone();
                            out.push(QueryResult::Series(filtered));
                        }
                    }
                }
                "timeserie" if target.target == REPLICATION_LAGS_TARGET => {
                    for ts in self.lags.values() {
                        out.push(QueryResult::Series(filter_time_series(ts, from, to)));
                    }
                }
                "timeserie" => {
                    if let Some(ts) = self.member_lag(&target.target) {
                        out.push(QueryResult::Series(filter_time_series(ts, from, to)));
                        continue;
                    }
                    let Some(ts) = self.series.get(&target.target) else {
                        debug!(target = %target.target, "grafana: unknown target");
                        continue;
                    };
                    let mut filtered = filter_time_series(ts, from, to);
                    filtered.target = short_label(&target.target).to_string();
                    out.push(QueryResult::Series(filtered));
                }
                "table" if target.target == HOST_INFO_TARGET => {
                    out.push(QueryResult::Table(self.host_info_table()));
                }
                other => {
                    debug!(target = %target.target, kind = other, "grafana: unsupported target");
                }
            }
        }
        out
    }

    fn host_info_table(&self) -> Table {
        let host = &self.server_info.host_info;
        let mut rows = vec![format!(
            "CPU: {} cores ({})",
            host.system.num_cores, host.system.cpu_arch
        )];
        if self.show_hostname {
            rows.push(format!("Host: {}", host.system.hostname));
        }
        rows.push(format!(
            "Memory: {}",
            storage_size(host.system.mem_size_mb.max(0) as u64 * 1024 * 1024)
        ));
        let wt_cache = self.max_wt_cache();
        if wt_cache > 0.0 {
            rows.push(format!("WiredTiger cache: {:.1} GB", wt_cache));
        }
        rows.push(format!("{} ({})", host.os.os_type, host.os.version));
        rows.push(host.os.name.clone());
        rows.push(format!("MongoDB v{}", self.server_info.build_info.version));
        Table {
            columns: vec![TableColumn {
                text: "Configurations".to_string(),
                column_type: "String".to_string(),
            }],
            table_type: "table",
            rows: rows.into_iter().map(|r| vec![r]).collect(),
        }
    }

    /// Dashboard paths covering the loaded time range.
    pub fn endpoints(&self) -> Vec<String> {
        let (Some(first), Some(last)) = (self.server_status.first(), self.server_status.last())
        else {
            return Vec::new();
        };
        let from = first.local_time.timestamp_millis();
        let to = last.local_time.timestamp_millis();
        [ANALYTICS_ENDPOINT, DISKS_ENDPOINT]
            .iter()
            .map(|path| format!("{}?orgId=1&from={}&to={}", path, from, to))
            .collect()
    }
}

/// `"32.0 GB"`, `"512.0 MB"`, `"10 B"`.
fn storage_size(bytes: u64) -> String {
    const UNITS: &[(u64, &str)] = &[
        (1 << 40, "TB"),
        (1 << 30, "GB"),
        (1 << 20, "MB"),
        (1 << 10, "KB"),
    ];
    for (size, unit) in UNITS {
        if bytes >= *size {
            return format!("{:.1} {}", bytes as f64 / *size as f64, unit);
        }
    }
    format!("{} B", bytes)
}
