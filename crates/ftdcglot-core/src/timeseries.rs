//! Chart series built from structured samples, in Grafana's
//! `{ target, datapoints: [[value, epoch_ms], ...] }` shape.
//!
//! Gauges are plotted as-is. Cumulative counters become per-second rates
//! between consecutive samples. Samples taken right after a restart (uptime
//! not increasing) are left out of the server-status charts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ReplSetStatus, ServerStatus, SystemMetrics};

/// Most points returned for one series in one query.
pub const MAX_DATA_POINTS: usize = 600;

const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub const SERVER_STATUS_LEGENDS: &[&str] = &[
    "mem_resident",
    "mem_virtual",
    "mem_page_faults",
    "conns_active",
    "conns_available",
    "conns_current",
    "conns_created/s",
    "latency_read",
    "latency_write",
    "latency_command",
    "net_in",
    "net_out",
    "net_requests",
    "net_physical_in",
    "net_physical_out",
    "ops_query",
    "ops_insert",
    "ops_update",
    "ops_delete",
    "ops_getmore",
    "ops_command",
    "q_active_read",
    "q_active_write",
    "q_queued_read",
    "q_queued_write",
    "scan_keys",
    "scan_objects",
    "scan_sort",
];

pub const WIREDTIGER_LEGENDS: &[&str] = &[
    "wt_blkmgr_read",
    "wt_blkmgr_written",
    "wt_blkmgr_written_checkpoint",
    "wt_cache_max",
    "wt_cache_used",
    "wt_cache_dirty",
    "wt_modified_evicted",
    "wt_unmodified_evicted",
    "wt_cache_read_in",
    "wt_cache_written_from",
    "wt_dhandles_active",
    "ticket_avail_read",
    "ticket_avail_write",
];

pub const SYSTEM_METRICS_LEGENDS: &[&str] = &[
    "cpu_idle",
    "cpu_iowait",
    "cpu_nice",
    "cpu_softirq",
    "cpu_steal",
    "cpu_system",
    "cpu_user",
];

/// Targets answered with one series per disk device.
pub const DISK_TARGETS: &[&str] = &[
    "disks_utils",
    "disks_iops",
    "disks_queue_length",
    "read_time_ms",
    "write_time_ms",
    "io_queued_ms",
];

/// Answered with one series per replica-set member; a single member is
/// `replication_lags_<member>`.
pub const REPLICATION_LAGS_TARGET: &str = "replication_lags";

/// One named series.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TimeSeries {
    pub target: String,
    /// `[value, epoch_ms]` pairs in time order.
    pub datapoints: Vec<[f64; 2]>,
}

impl TimeSeries {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            datapoints: Vec::new(),
        }
    }

    /// Appends a point; negative values are clamped to 0.
    pub fn push(&mut self, value: f64, epoch_ms: f64) {
        self.datapoints.push([value.max(0.0), epoch_ms]);
    }

    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }
}

/// Per-device disk series.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DiskStats {
    pub utilization: TimeSeries,
    pub iops: TimeSeries,
    pub io_in_progress: TimeSeries,
    pub read_time_ms: TimeSeries,
    pub write_time_ms: TimeSeries,
    pub io_queued_ms: TimeSeries,
}

impl DiskStats {
    /// Series answering one of [`DISK_TARGETS`].
    pub fn for_target(&self, target: &str) -> Option<&TimeSeries> {
        Some(match target {
            "disks_utils" => &self.utilization,
            "disks_iops" => &self.iops,
            "disks_queue_length" => &self.io_in_progress,
            "read_time_ms" => &self.read_time_ms,
            "write_time_ms" => &self.write_time_ms,
            "io_queued_ms" => &self.io_queued_ms,
            _ => return None,
        })
    }
}

pub type SeriesMap = BTreeMap<String, TimeSeries>;

fn empty_series(legends: &[&str]) -> SeriesMap {
    legends
        .iter()
        .map(|l| (l.to_string(), TimeSeries::new(*l)))
        .collect()
}

fn push(map: &mut SeriesMap, legend: &str, value: f64, t: f64) {
    if let Some(series) = map.get_mut(legend) {
        series.push(value, t);
    }
}

fn diff(curr: u64, prev: u64) -> f64 {
    curr.saturating_sub(prev) as f64
}

fn epoch_ms(s: &ServerStatus) -> f64 {
    s.local_time.timestamp_millis() as f64
}

/// Seconds between two samples, rounded, never below 1.
fn interval_secs(curr: &ServerStatus, prev: &ServerStatus) -> f64 {
    let ms = (curr.local_time - prev.local_time).num_milliseconds() as f64;
    (ms / 1000.0).round().max(1.0)
}

/// Memory, connections, latency, network, opcounter, queue and scan charts.
pub fn server_status_series(docs: &[ServerStatus]) -> SeriesMap {
    let mut map = empty_series(SERVER_STATUS_LEGENDS);
    let mut prev: Option<&ServerStatus> = None;
    for stat in docs {
        let running = prev.is_none_or(|p| stat.uptime > p.uptime);
        if running {
            let t = epoch_ms(stat);
            push(&mut map, "mem_resident", stat.mem.resident as f64 / 1024.0, t);
            push(&mut map, "mem_virtual", stat.mem.virtual_mb as f64 / 1024.0, t);
            push(&mut map, "conns_active", stat.connections.active as f64, t);
            push(&mut map, "conns_available", stat.connections.available as f64, t);
            push(&mut map, "conns_current", stat.connections.current as f64, t);
            push(&mut map, "latency_read", stat.op_latencies.reads.avg_ms(), t);
            push(&mut map, "latency_write", stat.op_latencies.writes.avg_ms(), t);
            push(&mut map, "latency_command", stat.op_latencies.commands.avg_ms(), t);
            let gl = &stat.global_lock;
            push(&mut map, "q_active_read", gl.active_clients.readers as f64, t);
            push(&mut map, "q_active_write", gl.active_clients.writers as f64, t);
            push(&mut map, "q_queued_read", gl.current_queue.readers as f64, t);
            push(&mut map, "q_queued_write", gl.current_queue.writers as f64, t);

            if let Some(p) = prev {
                let secs = interval_secs(stat, p);
                let rate = |c: u64, q: u64| diff(c, q) / secs;
                let mb_rate = |c: u64, q: u64| diff(c, q) / MB / secs;
                let (n, pn) = (&stat.network, &p.network);
                let (o, po) = (&stat.opcounters, &p.opcounters);
                let (m, pm) = (&stat.metrics, &p.metrics);
                push(
                    &mut map,
                    "mem_page_faults",
                    rate(stat.extra_info.page_faults, p.extra_info.page_faults),
                    t,
                );
                push(
                    &mut map,
                    "conns_created/s",
                    rate(stat.connections.total_created, p.connections.total_created),
                    t,
                );
                push(&mut map, "net_in", mb_rate(n.bytes_in, pn.bytes_in), t);
                push(&mut map, "net_out", mb_rate(n.bytes_out, pn.bytes_out), t);
                push(&mut map, "net_requests", rate(n.num_requests, pn.num_requests), t);
                push(
                    &mut map,
                    "net_physical_in",
                    mb_rate(n.physical_bytes_in, pn.physical_bytes_in),
                    t,
                );
                push(
                    &mut map,
                    "net_physical_out",
                    mb_rate(n.physical_bytes_out, pn.physical_bytes_out),
                    t,
                );
                push(&mut map, "ops_query", rate(o.query, po.query), t);
                push(&mut map, "ops_insert", rate(o.insert, po.insert), t);
                push(&mut map, "ops_update", rate(o.update, po.update), t);
                push(&mut map, "ops_delete", rate(o.delete, po.delete), t);
                push(&mut map, "ops_getmore", rate(o.getmore, po.getmore), t);
                push(&mut map, "ops_command", rate(o.command, po.command), t);
                push(
                    &mut map,
                    "scan_keys",
                    rate(m.query_executor.scanned, pm.query_executor.scanned),
                    t,
                );
                push(
                    &mut map,
                    "scan_objects",
                    rate(m.query_executor.scanned_objects, pm.query_executor.scanned_objects),
                    t,
                );
                push(
                    &mut map,
                    "scan_sort",
                    rate(m.operation.scan_and_order, pm.operation.scan_and_order),
                    t,
                );
            }
        }
        prev = Some(stat);
    }
    map
}

/// WiredTiger cache, block manager, data handle and ticket charts.
pub fn wiredtiger_series(docs: &[ServerStatus]) -> SeriesMap {
    let mut map = empty_series(WIREDTIGER_LEGENDS);
    let mut prev: Option<&ServerStatus> = None;
    for stat in docs {
        let running = prev.is_none_or(|p| stat.uptime > p.uptime);
        if running {
            let t = epoch_ms(stat);
            let wt = &stat.wired_tiger;
            push(&mut map, "wt_cache_max", wt.cache.max_bytes_configured as f64 / GB, t);
            push(&mut map, "wt_cache_used", wt.cache.currently_in_cache as f64 / GB, t);
            push(&mut map, "wt_cache_dirty", wt.cache.tracked_dirty_bytes as f64 / GB, t);
            push(&mut map, "wt_dhandles_active", wt.data_handle.active as f64, t);
            let tx = &wt.concurrent_transactions;
            push(&mut map, "ticket_avail_read", tx.read.available as f64, t);
            push(&mut map, "ticket_avail_write", tx.write.available as f64, t);

            if let Some(p) = prev {
                let secs = interval_secs(stat, p);
                let pwt = &p.wired_tiger;
                let rate = |c: u64, q: u64| diff(c, q) / secs;
                let mb_rate = |c: u64, q: u64| diff(c, q) / MB / secs;
                let (b, pb) = (&wt.block_manager, &pwt.block_manager);
                let (c, pc) = (&wt.cache, &pwt.cache);
                push(&mut map, "wt_blkmgr_read", mb_rate(b.bytes_read, pb.bytes_read), t);
                push(
                    &mut map,
                    "wt_blkmgr_written",
                    mb_rate(b.bytes_written, pb.bytes_written),
                    t,
                );
                push(
                    &mut map,
                    "wt_blkmgr_written_checkpoint",
                    mb_rate(b.bytes_written_checkpoint, pb.bytes_written_checkpoint),
                    t,
                );
                push(
                    &mut map,
                    "wt_modified_evicted",
                    rate(c.modified_pages_evicted, pc.modified_pages_evicted),
                    t,
                );
                push(
                    &mut map,
                    "wt_unmodified_evicted",
                    rate(c.unmodified_pages_evicted, pc.unmodified_pages_evicted),
                    t,
                );
                push(
                    &mut map,
                    "wt_cache_read_in",
                    mb_rate(c.bytes_read_into_cache, pc.bytes_read_into_cache),
                    t,
                );
                push(
                    &mut map,
                    "wt_cache_written_from",
                    mb_rate(c.bytes_written_from_cache, pc.bytes_written_from_cache),
                    t,
                );
            }
        }
        prev = Some(stat);
    }
    map
}

/// CPU percentage charts and per-device disk series.
pub fn system_metrics_series(list: &[SystemMetrics]) -> (SeriesMap, BTreeMap<String, DiskStats>) {
    let mut map = empty_series(SYSTEM_METRICS_LEGENDS);
    let mut disks: BTreeMap<String, DiskStats> = BTreeMap::new();

    for pair in list.windows(2) {
        let (prev, stat) = (&pair[0], &pair[1]);
        let t = stat.start.timestamp_millis() as f64;
        let elapsed_ms = (stat.start - prev.start).num_milliseconds();
        let elapsed_ms = if elapsed_ms > 0 { elapsed_ms as f64 } else { 1000.0 };

        for (device, disk) in &stat.disks {
            let before = prev.disks.get(device).cloned().unwrap_or_default();
            let stats = disks.entry(device.clone()).or_insert_with(|| DiskStats {
                utilization: TimeSeries::new(device.as_str()),
                iops: TimeSeries::new(device.as_str()),
                io_in_progress: TimeSeries::new(device.as_str()),
                read_time_ms: TimeSeries::new(device.as_str()),
                write_time_ms: TimeSeries::new(device.as_str()),
                io_queued_ms: TimeSeries::new(device.as_str()),
            });
            let ios = diff(
                disk.reads.wrapping_add(disk.writes),
                before.reads.wrapping_add(before.writes),
            );
            stats
                .utilization
                .push(100.0 * diff(disk.io_time_ms, before.io_time_ms) / elapsed_ms, t);
            stats.iops.push(ios * 1000.0 / elapsed_ms, t);
            stats.io_in_progress.push(disk.io_in_progress as f64, t);
            stats
                .read_time_ms
                .push(diff(disk.read_time_ms, before.read_time_ms), t);
            stats
                .write_time_ms
                .push(diff(disk.write_time_ms, before.write_time_ms), t);
            stats
                .io_queued_ms
                .push(diff(disk.io_queued_ms, before.io_queued_ms), t);
        }

        let total = diff(stat.cpu.total_ms(), prev.cpu.total_ms());
        let pct = |c: u64, p: u64| {
            if total > 0.0 {
                100.0 * diff(c, p) / total
            } else {
                0.0
            }
        };
        let (c, p) = (&stat.cpu, &prev.cpu);
        push(&mut map, "cpu_idle", pct(c.idle_ms, p.idle_ms), t);
        push(&mut map, "cpu_iowait", pct(c.iowait_ms, p.iowait_ms), t);
        push(&mut map, "cpu_nice", pct(c.nice_ms, p.nice_ms), t);
        push(&mut map, "cpu_softirq", pct(c.softirq_ms, p.softirq_ms), t);
        push(&mut map, "cpu_steal", pct(c.steal_ms, p.steal_ms), t);
        push(&mut map, "cpu_system", pct(c.system_ms, p.system_ms), t);
        push(&mut map, "cpu_user", pct(c.user_ms, p.user_ms), t);
    }
    (map, disks)
}

/// Seconds each member trails the primary, keyed by member legend.
/// Statuses taken while the set had no primary add no points.
pub fn replication_lag_series(list: &[ReplSetStatus]) -> SeriesMap {
    let mut map = SeriesMap::new();
    for status in list {
        let Some(lags) = status.lags() else {
            continue;
        };
        let t = status.date.timestamp_millis() as f64;
        for (member, lag) in lags {
            let legend = member.legend();
            map.entry(legend.clone())
                .or_insert_with(|| TimeSeries::new(legend))
                .push(lag as f64, t);
        }
    }
    map
}

// ---------------------------------------------------------------------------
// Range filtering
// ---------------------------------------------------------------------------

/// Index of the point whose timestamp is closest to `target_ms`.
/// `points` must be non-empty and sorted by time.
pub fn closest_index(points: &[[f64; 2]], target_ms: f64) -> usize {
    let idx = points.partition_point(|p| p[1] < target_ms);
    if idx == 0 {
        return 0;
    }
    if idx >= points.len() {
        return points.len() - 1;
    }
    let below = target_ms - points[idx - 1][1];
    let above = points[idx][1] - target_ms;
    if below <= above { idx - 1 } else { idx }
}

/// Points of `ts` between `from_ms` and `to_ms` (closest matches,
/// inclusive), evenly thinned to at most [`MAX_DATA_POINTS`].
pub fn filter_time_series(ts: &TimeSeries, from_ms: f64, to_ms: f64) -> TimeSeries {
    let mut out = TimeSeries::new(ts.target.clone());
    if ts.datapoints.is_empty() || to_ms < from_ms {
        return out;
    }
    let first = closest_index(&ts.datapoints, from_ms);
    let last = closest_index(&ts.datapoints, to_ms);
    let points = &ts.datapoints[first..=last];
    if points.len() > MAX_DATA_POINTS {
        out.datapoints = (0..MAX_DATA_POINTS)
            .map(|i| points[points.len() * i / MAX_DATA_POINTS])
            .collect();
    } else {
        out.datapoints = points.to_vec();
    }
    out
}

/// Legend without its chart-group prefix (`ops_query` → `query`).
pub fn short_label(label: &str) -> &str {
    const PREFIXES: &[&str] = &[
        "conns_",
        "cpu_",
        "latency_",
        "mem_",
        "net_",
        "ops_",
        "q_active_",
        "q_queued_",
        "scan_",
        "ticket_",
        "wt_blkmgr_",
        "wt_cache_",
        "wt_dhandles_",
    ];
    for prefix in PREFIXES {
        if let Some(rest) = label.strip_prefix(prefix) {
            return rest;
        }
    }
    if let Some(rest) = label.strip_prefix("wt_") {
        return rest.strip_suffix("_evicted").unwrap_or(rest);
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DiskMetrics, ReplSetMember};
    use chrono::{DateTime, Duration, Utc};

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_600_000_000, 0).unwrap()
    }

    fn status(i: i64, uptime: u64) -> ServerStatus {
        let mut s = ServerStatus {
            local_time: t0() + Duration::seconds(i),
            uptime,
            ..Default::default()
        };
        s.mem.resident = 2048;
        s.opcounters.query = (i as u64) * 50;
        s.network.bytes_in = (i as u64) * 2 * 1024 * 1024;
        s.wired_tiger.cache.max_bytes_configured = 1 << 30;
        s
    }

    fn series(n: usize) -> TimeSeries {
        let mut ts = TimeSeries::new("x");
        for i in 0..n {
            ts.push(i as f64, (i * 1000) as f64);
        }
        ts
    }

    #[test]
    fn test_server_status_rates() {
        let docs: Vec<_> = (0..3).map(|i| status(i, 100 + i as u64)).collect();
        let map = server_status_series(&docs);
        assert_eq!(map.len(), SERVER_STATUS_LEGENDS.len());
        assert_eq!(map["mem_resident"].len(), 3);
        assert_eq!(map["mem_resident"].datapoints[0][0], 2.0);
        // Rates start from the second sample.
        assert_eq!(map["ops_query"].len(), 2);
        assert_eq!(map["ops_query"].datapoints[0][0], 50.0);
        assert_eq!(map["net_in"].datapoints[1][0], 2.0);
        assert_eq!(
            map["ops_query"].datapoints[0][1],
            (t0() + Duration::seconds(1)).timestamp_millis() as f64
        );
        assert!(map.contains_key("net_physical_in"));
    }

    #[test]
    fn test_restart_sample_skipped() {
        let docs = vec![status(0, 100), status(1, 101), status(2, 1), status(3, 2)];
        let map = server_status_series(&docs);
        assert_eq!(map["mem_resident"].len(), 3);
    }

    #[test]
    fn test_wiredtiger_gauges() {
        let docs: Vec<_> = (0..2).map(|i| status(i, 10 + i as u64)).collect();
        let map = wiredtiger_series(&docs);
        assert_eq!(map["wt_cache_max"].datapoints[0][0], 1.0);
        assert_eq!(map["wt_blkmgr_read"].len(), 1);
    }

    #[test]
    fn test_system_metrics_cpu_and_disks() {
        let mut list = Vec::new();
        for i in 0..2u64 {
            let mut m = SystemMetrics {
                start: t0() + Duration::seconds(i as i64),
                ..Default::default()
            };
            m.cpu.user_ms = i * 250;
            m.cpu.idle_ms = i * 750;
            m.disks.insert(
                "sda".into(),
                DiskMetrics {
                    io_time_ms: i * 500,
                    reads: i * 30,
                    writes: i * 70,
                    io_in_progress: 4,
                    ..Default::default()
                },
            );
            list.push(m);
        }
        let (map, disks) = system_metrics_series(&list);
        assert_eq!(map["cpu_user"].datapoints[0][0], 25.0);
        assert_eq!(map["cpu_idle"].datapoints[0][0], 75.0);
        let sda = &disks["sda"];
        assert_eq!(sda.utilization.datapoints[0][0], 50.0);
        assert_eq!(sda.iops.datapoints[0][0], 100.0);
        assert_eq!(sda.io_in_progress.datapoints[0][0], 4.0);
        assert_eq!(sda.for_target("disks_iops"), Some(&sda.iops));
        assert_eq!(sda.for_target("cpu_user"), None);
    }

    fn repl_status(i: i64, members: &[(&str, i32, u64)]) -> ReplSetStatus {
        ReplSetStatus {
            date: t0() + Duration::seconds(i),
            members: members
                .iter()
                .map(|&(name, state, optime_secs)| ReplSetMember {
                    name: name.into(),
                    state,
                    optime_secs,
                })
                .collect(),
        }
    }

    #[test]
    fn test_replication_lags_per_member() {
        let list = vec![
            repl_status(0, &[("a.x:1", 1, 100), ("b.x:1", 2, 97), ("c.x:1", 7, 0)]),
            repl_status(10, &[("a.x:1", 2, 105), ("b.x:1", 2, 104)]),
            repl_status(20, &[("a.x:1", 1, 120), ("b.x:1", 2, 120)]),
        ];
        let map = replication_lag_series(&list);
        let legends: Vec<&String> = map.keys().collect();
        assert_eq!(legends, vec!["a:1", "b:1"]);
        assert_eq!(map["b:1"].target, "b:1");
        assert_eq!(map["b:1"].datapoints[0], [3.0, t0().timestamp_millis() as f64]);
        assert_eq!(map["b:1"].datapoints[1][0], 0.0);
        assert_eq!(map["a:1"].len(), 2);
    }

    #[test]
    fn test_negative_values_clamped() {
        let mut ts = TimeSeries::new("x");
        ts.push(-3.0, 1.0);
        assert_eq!(ts.datapoints[0], [0.0, 1.0]);
    }

    #[test]
    fn test_closest_index() {
        let ts = series(10);
        let p = &ts.datapoints;
        assert_eq!(closest_index(p, -5.0), 0);
        assert_eq!(closest_index(p, 99_999.0), 9);
        assert_eq!(closest_index(p, 3000.0), 3);
        assert_eq!(closest_index(p, 3400.0), 3);
        assert_eq!(closest_index(p, 3600.0), 4);
    }

    #[test]
    fn test_filter_range() {
        let ts = series(10);
        let out = filter_time_series(&ts, 2000.0, 5000.0);
        assert_eq!(out.target, "x");
        let times: Vec<f64> = out.datapoints.iter().map(|p| p[1]).collect();
        assert_eq!(times, vec![2000.0, 3000.0, 4000.0, 5000.0]);
        assert!(filter_time_series(&TimeSeries::new("y"), 0.0, 1.0).is_empty());
    }

    #[test]
    fn test_filter_downsamples_to_cap() {
        let ts = series(5000);
        let out = filter_time_series(&ts, 0.0, 5_000_000.0);
        assert_eq!(out.len(), MAX_DATA_POINTS);
        assert_eq!(out.datapoints[0][1], 0.0);
        assert!(out.datapoints.windows(2).all(|w| w[0][1] < w[1][1]));
    }

    #[test]
    fn test_short_label() {
        assert_eq!(short_label("ops_query"), "query");
        assert_eq!(short_label("q_queued_read"), "read");
        assert_eq!(short_label("wt_cache_used"), "used");
        assert_eq!(short_label("wt_modified_evicted"), "modified");
        assert_eq!(short_label("conns_created/s"), "created/s");
        assert_eq!(short_label("host_info"), "host_info");
    }
}
