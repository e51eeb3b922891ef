//! Windowed summaries of server-status samples, rendered as text tables.
//!
//! Samples are grouped into windows of at least `span` seconds. Cumulative
//! counters are reported as the difference between the window's last sample
//! and the previous window's last sample; gauges (queues, tickets) are
//! averaged over the window. A restart (uptime going backwards or a new pid)
//! closes the window and prints a `REBOOT` row.

use std::fmt;
use std::str::FromStr;

use chrono::SecondsFormat;

use crate::model::{OpLatency, ServerStatus};

/// Windows per capture when the span is chosen automatically.
pub const AUTO_SPAN_WINDOWS: i64 = 20;

/// Window length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Span {
    /// Total capture duration divided by [`AUTO_SPAN_WINDOWS`].
    #[default]
    Auto,
    Seconds(u64),
}

impl Span {
    /// Window length in seconds for `docs`.
    pub fn resolve(self, docs: &[ServerStatus]) -> i64 {
        match self {
            Span::Seconds(s) => i64::try_from(s).unwrap_or(i64::MAX),
            Span::Auto => match (docs.first(), docs.last()) {
                (Some(first), Some(last)) => {
                    ((last.local_time - first.local_time).num_seconds() / AUTO_SPAN_WINDOWS).max(1)
                }
                _ => 1,
            },
        }
    }
}

impl FromStr for Span {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Span::Auto);
        }
        s.parse::<u64>()
            .map(Span::Seconds)
            .map_err(|_| format!("invalid span '{}': expected seconds or 'auto'", s))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Span::Auto => write!(f, "auto"),
            Span::Seconds(s) => write!(f, "{}s", s),
        }
    }
}

// ---------------------------------------------------------------------------
// Windowing
// ---------------------------------------------------------------------------

/// One output row of a section.
#[derive(Debug)]
pub enum Window<'a> {
    Span {
        /// Last sample of the previous window (counter baseline).
        base: &'a ServerStatus,
        /// Samples inside the window; never empty, last one closes it.
        samples: &'a [ServerStatus],
    },
    Reboot,
}

impl<'a> Window<'a> {
    fn end(base: &'a ServerStatus, samples: &'a [ServerStatus]) -> &'a ServerStatus {
        samples.last().unwrap_or(base)
    }
}

/// Splits `docs` into windows of at least `span` seconds.
pub fn windows(docs: &[ServerStatus], span: i64) -> Vec<Window<'_>> {
    let mut out = Vec::new();
    let mut base = 0usize;
    for i in 1..docs.len() {
        if docs[i].restarted_since(&docs[i - 1]) {
            out.push(Window::Reboot);
            base = i;
            continue;
        }
        let elapsed = (docs[i].local_time - docs[base].local_time).num_seconds();
        if elapsed >= span || i == docs.len() - 1 {
            out.push(Window::Span {
                base: &docs[base],
                samples: &docs[base + 1..=i],
            });
            base = i;
        }
    }
    out
}

fn delta(end: u64, start: u64) -> u64 {
    end.saturating_sub(start)
}

fn average(samples: &[ServerStatus], f: impl Fn(&ServerStatus) -> u64) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    samples.iter().map(&f).sum::<u64>() / samples.len() as u64
}

fn elapsed_secs(base: &ServerStatus, end: &ServerStatus) -> u64 {
    (end.local_time - base.local_time).num_seconds().max(0) as u64
}

fn timestamp(s: &ServerStatus) -> String {
    s.local_time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// Table rendering
// ---------------------------------------------------------------------------

const TIME_WIDTH: usize = 25;

struct Table {
    widths: Vec<usize>,
    lines: Vec<String>,
}

impl Table {
    fn new(title: &str, headers: &[(&str, usize)]) -> Self {
        let mut widths = vec![TIME_WIDTH];
        widths.extend(headers.iter().map(|(_, w)| *w));
        let mut table = Self {
            widths,
            lines: Vec::new(),
        };
        table.lines.push(format!("\n--- {} ---", title));
        table.border();
        let mut header = format!("|{:<w$}|", " Date/Time", w = TIME_WIDTH);
        for (name, w) in headers {
            header.push_str(&format!("{:>w$}|", name, w = *w));
        }
        table.lines.push(header);
        table.separator('|');
        table
    }

    fn rule(&self, edge: char) -> String {
        let mut line = String::new();
        line.push(edge);
        for w in &self.widths {
            line.push_str(&"-".repeat(*w));
            line.push(edge);
        }
        line
    }

    fn border(&mut self) {
        let line = self.rule('+');
        self.lines.push(line);
    }

    fn separator(&mut self, edge: char) {
        let line = self.rule(edge);
        self.lines.push(line);
    }

    fn reboot(&mut self) {
        let rule = self.rule('|');
        let label = "|-- REBOOT ";
        let line = format!("{}{}", label, &rule[label.len()..]);
        self.lines.push(line);
    }

    fn row(&mut self, time: &str, cells: &[String]) {
        let mut line = format!("|{:<w$}|", time, w = TIME_WIDTH);
        for (cell, w) in cells.iter().zip(&self.widths[1..]) {
            line.push_str(&format!("{:>w$}|", cell, w = *w));
        }
        self.lines.push(line);
    }

    fn finish(mut self) -> String {
        self.border();
        self.lines.join("\n")
    }
}

fn render<'a>(
    table: Table,
    windows: &[Window<'a>],
    cells: impl Fn(&'a ServerStatus, &'a [ServerStatus], &'a ServerStatus) -> Vec<String>,
) -> String {
    let mut table = table;
    for window in windows {
        match window {
            Window::Reboot => table.reboot(),
            Window::Span { base, samples } => {
                let end = Window::end(*base, *samples);
                table.row(&timestamp(end), &cells(*base, *samples, end));
            }
        }
    }
    table.finish()
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Memory, page faults, op counters and overall ops per second.
pub fn summary_section(windows: &[Window<'_>]) -> String {
    let table = Table::new(
        "Analytic Summary",
        &[
            ("res", 7),
            ("virt", 7),
            ("fault", 6),
            ("Command", 9),
            ("Delete", 9),
            ("Getmore", 9),
            ("Insert", 9),
            ("Query", 9),
            ("Update", 9),
            ("iops", 9),
        ],
    );
    render(table, windows, |base, _, end| {
        let (a, b) = (&end.opcounters, &base.opcounters);
        let secs = elapsed_secs(base, end);
        let iops = if secs > 0 {
            delta(a.total(), b.total()) / secs
        } else {
            0
        };
        vec![
            end.mem.resident.to_string(),
            end.mem.virtual_mb.to_string(),
            delta(end.extra_info.page_faults, base.extra_info.page_faults).to_string(),
            delta(a.command, b.command).to_string(),
            delta(a.delete, b.delete).to_string(),
            delta(a.getmore, b.getmore).to_string(),
            delta(a.insert, b.insert).to_string(),
            delta(a.query, b.query).to_string(),
            delta(a.update, b.update).to_string(),
            iops.to_string(),
        ]
    })
}

/// Global lock time and averaged active clients / queue lengths.
pub fn global_lock_section(windows: &[Window<'_>]) -> String {
    let table = Table::new(
        "Global Locks Summary",
        &[
            ("TotalTime(ms)", 14),
            ("active", 10),
            ("act.readers", 12),
            ("act.writers", 12),
            ("queued", 10),
            ("q.readers", 12),
            ("q.writers", 12),
        ],
    );
    render(table, windows, |base, samples, end| {
        vec![
            (delta(end.global_lock.total_time, base.global_lock.total_time) / 1000).to_string(),
            average(samples, |s| s.global_lock.active_clients.total).to_string(),
            average(samples, |s| s.global_lock.active_clients.readers).to_string(),
            average(samples, |s| s.global_lock.active_clients.writers).to_string(),
            average(samples, |s| s.global_lock.current_queue.total).to_string(),
            average(samples, |s| s.global_lock.current_queue.readers).to_string(),
            average(samples, |s| s.global_lock.current_queue.writers).to_string(),
        ]
    })
}

/// Average latency (ms/op) of the operations completed in each window.
pub fn latency_section(windows: &[Window<'_>]) -> String {
    let table = Table::new(
        "Latencies Summary (ms)",
        &[("reads", 10), ("writes", 10), ("commands", 10)],
    );
    render(table, windows, |base, _, end| {
        let avg = |a: &OpLatency, b: &OpLatency| {
            let ops = delta(a.ops, b.ops);
            if ops == 0 {
                0.0
            } else {
                delta(a.latency, b.latency) as f64 / ops as f64 / 1000.0
            }
        };
        let (e, b) = (&end.op_latencies, &base.op_latencies);
        vec![
            format!("{:.1}", avg(&e.reads, &b.reads)),
            format!("{:.1}", avg(&e.writes, &b.writes)),
            format!("{:.1}", avg(&e.commands, &b.commands)),
        ]
    })
}

/// Query executor and document counters.
pub fn metrics_section(windows: &[Window<'_>]) -> String {
    let table = Table::new(
        "Metrics",
        &[
            ("Scanned", 10),
            ("ScannedObj", 12),
            ("ScanAndOrder", 12),
            ("WriteConflicts", 14),
            ("Deleted", 10),
            ("Inserted", 10),
            ("Returned", 10),
            ("Updated", 10),
        ],
    );
    render(table, windows, |base, _, end| {
        let (e, b) = (&end.metrics, &base.metrics);
        vec![
            delta(e.query_executor.scanned, b.query_executor.scanned).to_string(),
            delta(e.query_executor.scanned_objects, b.query_executor.scanned_objects).to_string(),
            delta(e.operation.scan_and_order, b.operation.scan_and_order).to_string(),
            delta(e.operation.write_conflicts, b.operation.write_conflicts).to_string(),
            delta(e.document.deleted, b.document.deleted).to_string(),
            delta(e.document.inserted, b.document.inserted).to_string(),
            delta(e.document.returned, b.document.returned).to_string(),
            delta(e.document.updated, b.document.updated).to_string(),
        ]
    })
}

/// WiredTiger cache size and per-minute eviction / IO rates.
pub fn wiredtiger_cache_section(windows: &[Window<'_>]) -> String {
    let table = Table::new(
        "WiredTiger Cache Summary",
        &[
            ("MaxBytes", 14),
            ("InCache", 14),
            ("DirtyBytes", 14),
            ("ModEvict/min", 14),
            ("UnmodEvict/min", 15),
            ("ReadIn/min", 14),
            ("WrittenFrom/min", 16),
        ],
    );
    render(table, windows, |base, _, end| {
        let minutes = (end.local_time - base.local_time).num_milliseconds() as f64 / 60_000.0;
        let per_min = |e: u64, b: u64| {
            if minutes > 0.0 {
                format!("{:.0}", delta(e, b) as f64 / minutes)
            } else {
                "0".to_string()
            }
        };
        let (e, b) = (&end.wired_tiger.cache, &base.wired_tiger.cache);
        vec![
            e.max_bytes_configured.to_string(),
            e.currently_in_cache.to_string(),
            e.tracked_dirty_bytes.to_string(),
            per_min(e.modified_pages_evicted, b.modified_pages_evicted),
            per_min(e.unmodified_pages_evicted, b.unmodified_pages_evicted),
            per_min(e.bytes_read_into_cache, b.bytes_read_into_cache),
            per_min(e.bytes_written_from_cache, b.bytes_written_from_cache),
        ]
    })
}

/// Averaged WiredTiger read/write tickets.
pub fn wiredtiger_tickets_section(windows: &[Window<'_>]) -> String {
    let table = Table::new(
        "WiredTiger Concurrent Transactions Summary",
        &[
            ("read avail", 12),
            ("read out", 12),
            ("read total", 12),
            ("write avail", 12),
            ("write out", 12),
            ("write total", 12),
        ],
    );
    render(table, windows, |_, samples, _| {
        vec![
            average(samples, |s| s.wired_tiger.concurrent_transactions.read.available).to_string(),
            average(samples, |s| s.wired_tiger.concurrent_transactions.read.out).to_string(),
            average(samples, |s| s.wired_tiger.concurrent_transactions.read.total_tickets).to_string(),
            average(samples, |s| s.wired_tiger.concurrent_transactions.write.available).to_string(),
            average(samples, |s| s.wired_tiger.concurrent_transactions.write.out).to_string(),
            average(samples, |s| s.wired_tiger.concurrent_transactions.write.total_tickets).to_string(),
        ]
    })
}

/// All sections, in report order.
pub fn print_all_stats(docs: &[ServerStatus], span: Span) -> String {
    let span = span.resolve(docs);
    let windows = windows(docs, span);
    [
        summary_section(&windows),
        global_lock_section(&windows),
        latency_section(&windows),
        metrics_section(&windows),
        wiredtiger_cache_section(&windows),
        wiredtiger_tickets_section(&windows),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_600_000_000, 0).unwrap()
    }

    /// One sample per second; counters grow by 10 per second.
    fn docs(n: u64) -> Vec<ServerStatus> {
        (0..n)
            .map(|i| {
                let mut s = ServerStatus {
                    local_time: t0() + Duration::seconds(i as i64),
                    uptime: 1000 + i,
                    pid: 7,
                    ..Default::default()
                };
                s.opcounters.query = i * 10;
                s.opcounters.insert = i * 10;
                s.global_lock.current_queue.readers = i;
                s.op_latencies.reads.latency = i * 20_000;
                s.op_latencies.reads.ops = i * 10;
                s.metrics.query_executor.scanned = i * 3;
                s.wired_tiger.cache.modified_pages_evicted = i * 60;
                s.wired_tiger.concurrent_transactions.read.available = 128;
                s
            })
            .collect()
    }

    #[test]
    fn test_span_parse_and_auto() {
        assert_eq!("auto".parse::<Span>().unwrap(), Span::Auto);
        assert_eq!("60".parse::<Span>().unwrap(), Span::Seconds(60));
        assert!("ten".parse::<Span>().is_err());

        let d = docs(201);
        assert_eq!(Span::Auto.resolve(&d), 10);
        assert_eq!(Span::Auto.resolve(&d[..3]), 1);
        assert_eq!(Span::Auto.resolve(&[]), 1);
    }

    #[test]
    fn test_windows_cover_span() {
        let d = docs(11);
        let w = windows(&d, 5);
        assert_eq!(w.len(), 2);
        match &w[0] {
            Window::Span { base, samples } => {
                assert_eq!(base.uptime, 1000);
                assert_eq!(samples.len(), 5);
                assert_eq!(samples[4].uptime, 1005);
            }
            Window::Reboot => panic!("unexpected reboot"),
        }
    }

    #[test]
    fn test_last_sample_closes_partial_window() {
        let d = docs(8);
        let w = windows(&d, 5);
        assert_eq!(w.len(), 2);
        match &w[1] {
            Window::Span { samples, .. } => assert_eq!(samples.len(), 2),
            Window::Reboot => panic!("unexpected reboot"),
        }
    }

    #[test]
    fn test_reboot_on_uptime_drop() {
        let mut d = docs(10);
        for s in &mut d[5..] {
            s.uptime -= 1000;
        }
        let w = windows(&d, 2);
        assert!(w.iter().any(|w| matches!(w, Window::Reboot)));

        let out = summary_section(&w);
        assert!(out.contains("REBOOT"), "{}", out);
    }

    #[test]
    fn test_reboot_on_pid_change() {
        let mut d = docs(6);
        d[3].pid = 8;
        d[4].pid = 8;
        d[5].pid = 8;
        let w = windows(&d, 100);
        assert!(matches!(w[0], Window::Reboot));
    }

    #[test]
    fn test_summary_iops_and_deltas() {
        let d = docs(11);
        let out = summary_section(&windows(&d, 10));
        // 10 s window, query and insert each +100: iops = 200 / 10 = 20.
        let row = out.lines().find(|l| l.starts_with("|2020")).unwrap();
        let cells: Vec<&str> = row.split('|').map(str::trim).collect();
        assert_eq!(cells[1], "2020-09-13T12:26:50Z");
        assert_eq!(cells[8], "100");
        assert_eq!(cells[9], "100");
        assert_eq!(cells[11], "20");
    }

    #[test]
    fn test_counter_going_backwards_saturates() {
        let mut d = docs(3);
        d[2].opcounters.query = 0;
        let out = summary_section(&windows(&d, 1));
        assert!(!out.contains("18446744073709551"));
    }

    #[test]
    fn test_queue_is_averaged() {
        let d = docs(5);
        let out = global_lock_section(&windows(&d, 4));
        // readers 1..=4 over the window: average 2 (integer).
        let row = out.lines().find(|l| l.starts_with("|2020")).unwrap();
        let cells: Vec<&str> = row.split('|').map(str::trim).collect();
        assert_eq!(cells[7], "2");
    }

    #[test]
    fn test_latency_per_window() {
        let d = docs(3);
        let out = latency_section(&windows(&d, 2));
        // 40_000 us over 20 ops = 2.0 ms.
        assert!(out.contains("2.0"), "{}", out);
    }

    #[test]
    fn test_cache_per_minute() {
        let d = docs(61);
        let out = wiredtiger_cache_section(&windows(&d, 60));
        let row = out.lines().find(|l| l.starts_with("|2020")).unwrap();
        let cells: Vec<&str> = row.split('|').map(str::trim).collect();
        assert_eq!(cells[5], "3600");
    }

    #[test]
    fn test_print_all_stats_has_every_section() {
        let out = print_all_stats(&docs(40), Span::Auto);
        for title in [
            "Analytic Summary",
            "Global Locks Summary",
            "Latencies Summary (ms)",
            "Metrics",
            "WiredTiger Cache Summary",
            "WiredTiger Concurrent Transactions Summary",
        ] {
            assert!(out.contains(title), "missing {}", title);
        }
        assert!(out.contains("128"));
    }

    #[test]
    fn test_empty_input() {
        let out = print_all_stats(&[], Span::Auto);
        assert!(out.contains("Analytic Summary"));
    }
}
