//! Record reassembly: decoded series → structured per-sample records.
//!
//! Counters are looked up by flattened path. A path missing from the block
//! (older server version, different storage engine) reads as 0. Disk devices
//! are not known up front, so `systemMetrics/disks/<dev>/<counter>` paths are
//! found by prefix scan.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::delta::DecodedBlock;
use crate::flatten::PATH_SEPARATOR;
use crate::model::{DiskMetrics, ServerStatus, SystemMetrics};

const DISKS_PREFIX: &str = "systemMetrics/disks/";

/// Counter slot of a [`DiskMetrics`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DiskCounter {
    ReadTimeMs,
    WriteTimeMs,
    IoQueuedMs,
    IoTimeMs,
    Reads,
    Writes,
    IoInProgress,
}

impl DiskCounter {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "read_time_ms" => DiskCounter::ReadTimeMs,
            "write_time_ms" => DiskCounter::WriteTimeMs,
            "io_queued_ms" => DiskCounter::IoQueuedMs,
            "io_time_ms" => DiskCounter::IoTimeMs,
            "reads" => DiskCounter::Reads,
            "writes" => DiskCounter::Writes,
            "io_in_progress" => DiskCounter::IoInProgress,
            _ => return None,
        })
    }

    fn set(self, disk: &mut DiskMetrics, value: u64) {
        match self {
            DiskCounter::ReadTimeMs => disk.read_time_ms = value,
            DiskCounter::WriteTimeMs => disk.write_time_ms = value,
            DiskCounter::IoQueuedMs => disk.io_queued_ms = value,
            DiskCounter::IoTimeMs => disk.io_time_ms = value,
            DiskCounter::Reads => disk.reads = value,
            DiskCounter::Writes => disk.writes = value,
            DiskCounter::IoInProgress => disk.io_in_progress = value,
        }
    }
}

/// Indexed view over one decoded block.
pub struct Attribs<'a> {
    block: &'a DecodedBlock,
    index: HashMap<&'a str, usize>,
    /// (device, counter, column); devices seen without a known counter still
    /// get an entry so they show up with zeroed metrics.
    disks: Vec<(&'a str, Option<DiskCounter>, usize)>,
}

impl<'a> Attribs<'a> {
    pub fn new(block: &'a DecodedBlock) -> Self {
        let mut disks = Vec::new();
        for (k, path) in block.paths.iter().enumerate() {
            let Some(rest) = path.strip_prefix(DISKS_PREFIX) else {
                continue;
            };
            let mut parts = rest.split(PATH_SEPARATOR);
            let (Some(device), Some(counter)) = (parts.next(), parts.next()) else {
                continue;
            };
            disks.push((device, DiskCounter::parse(counter), k));
        }
        Self {
            block,
            index: block.index(),
            disks,
        }
    }

    /// Number of samples in the block.
    pub fn len(&self) -> usize {
        self.block.sample_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of `path` at sample `i`; 0 when the path or sample is absent.
    pub fn get(&self, path: &str, i: usize) -> u64 {
        self.index
            .get(path)
            .and_then(|&k| self.block.series[k].get(i))
            .copied()
            .unwrap_or(0)
    }

    fn ss(&self, key: &str, i: usize) -> u64 {
        let mut path = String::with_capacity("serverStatus/".len() + key.len());
        path.push_str("serverStatus/");
        path.push_str(key);
        self.get(&path, i)
    }

    fn local_time(&self, i: usize) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.ss("localTime", i) as i64).unwrap_or_default()
    }

    /// Server-status record at sample `i`.
    pub fn server_status_at(&self, i: usize) -> ServerStatus {
        let mut s = ServerStatus {
            local_time: self.local_time(i),
            uptime: self.ss("uptime", i),
            pid: self.ss("pid", i),
            ..Default::default()
        };

        s.mem.resident = self.ss("mem/resident", i);
        s.mem.virtual_mb = self.ss("mem/virtual", i);

        s.network.bytes_in = self.ss("network/bytesIn", i);
        s.network.bytes_out = self.ss("network/bytesOut", i);
        s.network.num_requests = self.ss("network/numRequests", i);
        s.network.physical_bytes_in = self.ss("network/physicalBytesIn", i);
        s.network.physical_bytes_out = self.ss("network/physicalBytesOut", i);

        s.connections.current = self.ss("connections/current", i);
        s.connections.total_created = self.ss("connections/totalCreated", i);
        s.connections.available = self.ss("connections/available", i);
        s.connections.active = self.ss("connections/active", i);

        s.extra_info.page_faults = self.ss("extra_info/page_faults", i);

        let gl = &mut s.global_lock;
        gl.total_time = self.ss("globalLock/totalTime", i);
        gl.active_clients.total = self.ss("globalLock/activeClients/total", i);
        gl.active_clients.readers = self.ss("globalLock/activeClients/readers", i);
        gl.active_clients.writers = self.ss("globalLock/activeClients/writers", i);
        gl.current_queue.total = self.ss("globalLock/currentQueue/total", i);
        gl.current_queue.readers = self.ss("globalLock/currentQueue/readers", i);
        gl.current_queue.writers = self.ss("globalLock/currentQueue/writers", i);

        let m = &mut s.metrics;
        m.query_executor.scanned = self.ss("metrics/queryExecutor/scanned", i);
        m.query_executor.scanned_objects = self.ss("metrics/queryExecutor/scannedObjects", i);
        m.operation.scan_and_order = self.ss("metrics/operation/scanAndOrder", i);
        m.operation.write_conflicts = self.ss("metrics/operation/writeConflicts", i);
        m.document.deleted = self.ss("metrics/document/deleted", i);
        m.document.inserted = self.ss("metrics/document/inserted", i);
        m.document.returned = self.ss("metrics/document/returned", i);
        m.document.updated = self.ss("metrics/document/updated", i);

        let lat = &mut s.op_latencies;
        lat.commands.latency = self.ss("opLatencies/commands/latency", i);
        lat.commands.ops = self.ss("opLatencies/commands/ops", i);
        lat.reads.latency = self.ss("opLatencies/reads/latency", i);
        lat.reads.ops = self.ss("opLatencies/reads/ops", i);
        lat.writes.latency = self.ss("opLatencies/writes/latency", i);
        lat.writes.ops = self.ss("opLatencies/writes/ops", i);

        let ops = &mut s.opcounters;
        ops.command = self.ss("opcounters/command", i);
        ops.delete = self.ss("opcounters/delete", i);
        ops.getmore = self.ss("opcounters/getmore", i);
        ops.insert = self.ss("opcounters/insert", i);
        ops.query = self.ss("opcounters/query", i);
        ops.update = self.ss("opcounters/update", i);

        let wt = &mut s.wired_tiger;
        wt.block_manager.bytes_read = self.ss("wiredTiger/block-manager/bytes read", i);
        wt.block_manager.bytes_written = self.ss("wiredTiger/block-manager/bytes written", i);
        wt.block_manager.bytes_written_checkpoint =
            self.ss("wiredTiger/block-manager/bytes written for checkpoint", i);
        wt.cache.currently_in_cache = self.ss("wiredTiger/cache/bytes currently in the cache", i);
        wt.cache.max_bytes_configured = self.ss("wiredTiger/cache/maximum bytes configured", i);
        wt.cache.modified_pages_evicted = self.ss("wiredTiger/cache/modified pages evicted", i);
        wt.cache.unmodified_pages_evicted =
            self.ss("wiredTiger/cache/unmodified pages evicted", i);
        wt.cache.bytes_read_into_cache = self.ss("wiredTiger/cache/bytes read into cache", i);
        wt.cache.bytes_written_from_cache =
            self.ss("wiredTiger/cache/bytes written from cache", i);
        wt.cache.tracked_dirty_bytes =
            self.ss("wiredTiger/cache/tracked dirty bytes in the cache", i);
        wt.data_handle.active = self.ss(
            "wiredTiger/data-handle/connection data handles currently active",
            i,
        );
        wt.data_handle.size = self.ss("wiredTiger/data-handle/connection data handle size", i);
        let tx = &mut wt.concurrent_transactions;
        tx.read.available = self.ss("wiredTiger/concurrentTransactions/read/available", i);
        tx.read.out = self.ss("wiredTiger/concurrentTransactions/read/out", i);
        tx.read.total_tickets = self.ss("wiredTiger/concurrentTransactions/read/totalTickets", i);
        tx.write.available = self.ss("wiredTiger/concurrentTransactions/write/available", i);
        tx.write.out = self.ss("wiredTiger/concurrentTransactions/write/out", i);
        tx.write.total_tickets =
            self.ss("wiredTiger/concurrentTransactions/write/totalTickets", i);

        let g = &mut s.tcmalloc.generic;
        g.current_allocated_bytes = self.ss("tcmalloc/generic/current_allocated_bytes", i);
        g.heap_size = self.ss("tcmalloc/generic/heap_size", i);
        let t = &mut s.tcmalloc.tcmalloc;
        t.pageheap_free_bytes = self.ss("tcmalloc/tcmalloc/pageheap_free_bytes", i);
        t.pageheap_unmapped_bytes = self.ss("tcmalloc/tcmalloc/pageheap_unmapped_bytes", i);
        t.max_total_thread_cache_bytes =
            self.ss("tcmalloc/tcmalloc/max_total_thread_cache_bytes", i);
        t.current_total_thread_cache_bytes =
            self.ss("tcmalloc/tcmalloc/current_total_thread_cache_bytes", i);
        t.total_free_bytes = self.ss("tcmalloc/tcmalloc/total_free_bytes", i);
        t.central_cache_free_bytes = self.ss("tcmalloc/tcmalloc/central_cache_free_bytes", i);
        t.transfer_cache_free_bytes = self.ss("tcmalloc/tcmalloc/transfer_cache_free_bytes", i);
        t.thread_cache_free_bytes = self.ss("tcmalloc/tcmalloc/thread_cache_free_bytes", i);
        t.aggressive_memory_decommit =
            self.ss("tcmalloc/tcmalloc/aggressive_memory_decommit", i);
        t.pageheap_committed_bytes = self.ss("tcmalloc/tcmalloc/pageheap_committed_bytes", i);
        t.pageheap_scavenge_count = self.ss("tcmalloc/tcmalloc/pageheap_scavenge_count", i);
        t.pageheap_commit_count = self.ss("tcmalloc/tcmalloc/pageheap_commit_count", i);
        t.pageheap_total_commit_bytes =
            self.ss("tcmalloc/tcmalloc/pageheap_total_commit_bytes", i);
        t.pageheap_decommit_count = self.ss("tcmalloc/tcmalloc/pageheap_decommit_count", i);
        t.pageheap_total_decommit_bytes =
            self.ss("tcmalloc/tcmalloc/pageheap_total_decommit_bytes", i);
        t.pageheap_reserve_count = self.ss("tcmalloc/tcmalloc/pageheap_reserve_count", i);
        t.pageheap_total_reserve_bytes =
            self.ss("tcmalloc/tcmalloc/pageheap_total_reserve_bytes", i);
        t.spinlock_total_delay_ns = self.ss("tcmalloc/tcmalloc/spinlock_total_delay_ns", i);
        t.release_rate = self.ss("tcmalloc/tcmalloc/release_rate", i);

        s
    }

    /// System-metrics record at sample `i`.
    pub fn system_metrics_at(&self, i: usize) -> SystemMetrics {
        let cpu = |name: &str| self.get(&format!("systemMetrics/cpu/{}", name), i);
        let mut m = SystemMetrics {
            start: self.local_time(i),
            ..Default::default()
        };
        m.cpu.idle_ms = cpu("idle_ms");
        m.cpu.user_ms = cpu("user_ms");
        m.cpu.iowait_ms = cpu("iowait_ms");
        m.cpu.nice_ms = cpu("nice_ms");
        m.cpu.softirq_ms = cpu("softirq_ms");
        m.cpu.steal_ms = cpu("steal_ms");
        m.cpu.system_ms = cpu("system_ms");

        let mut disks: BTreeMap<String, DiskMetrics> = BTreeMap::new();
        for &(device, counter, k) in &self.disks {
            let disk = disks.entry(device.to_string()).or_default();
            if let Some(counter) = counter {
                let value = self.block.series[k].get(i).copied().unwrap_or(0);
                counter.set(disk, value);
            }
        }
        m.disks = disks;
        m
    }

    /// All records of the block, in sample order.
    pub fn samples(&self) -> impl Iterator<Item = (ServerStatus, SystemMetrics)> + '_ {
        (0..self.len()).map(|i| (self.server_status_at(i), self.system_metrics_at(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{DecodeOptions, decode_buffer};
    use crate::flatten::{SkippedLeaf, flatten};
    use crate::testing::{build_block, capture, chunk_envelope, compress_block, reference_sample};

    fn block(paths: &[&str], series: Vec<Vec<u64>>) -> DecodedBlock {
        DecodedBlock {
            offset: 0,
            num_deltas: (series[0].len() - 1) as u32,
            paths: paths.iter().map(|p| p.to_string()).collect(),
            series,
            skipped: Vec::<SkippedLeaf>::new(),
            repl_set: None,
        }
    }

    #[test]
    fn test_missing_keys_default_to_zero() {
        let b = block(&["serverStatus/uptime"], vec![vec![10, 11]]);
        let attribs = Attribs::new(&b);
        let s = attribs.server_status_at(1);
        assert_eq!(s.uptime, 11);
        assert_eq!(s.mem.resident, 0);
        assert_eq!(s.op_latencies.commands.ops, 0);
        assert_eq!(s.local_time.timestamp_millis(), 0);
        assert_eq!(attribs.get("serverStatus/uptime", 5), 0);
    }

    #[test]
    fn test_disks_grouped_by_device() {
        let b = block(
            &[
                "systemMetrics/cpu/user_ms",
                "systemMetrics/disks/sda/reads",
                "systemMetrics/disks/nvme0n1/writes",
                "systemMetrics/disks/sda/io_time_ms",
                "systemMetrics/disks/sda/unknown_counter",
                "systemMetrics/disksOther/x",
            ],
            vec![
                vec![1, 2],
                vec![10, 20],
                vec![30, 40],
                vec![50, 60],
                vec![7, 8],
                vec![9, 9],
            ],
        );
        let m = Attribs::new(&b).system_metrics_at(1);
        assert_eq!(m.cpu.user_ms, 2);
        assert_eq!(m.disks.len(), 2);
        assert_eq!(m.disks["sda"].reads, 20);
        assert_eq!(m.disks["sda"].io_time_ms, 60);
        assert_eq!(m.disks["sda"].writes, 0);
        assert_eq!(m.disks["nvme0n1"].writes, 40);
        let devices: Vec<&String> = m.disks.keys().collect();
        assert_eq!(devices, vec!["nvme0n1", "sda"]);
    }

    #[test]
    fn test_samples_from_decoded_capture() {
        let reference = reference_sample(1_600_000_000_000, 3600, 4242);
        let schema = flatten(&reference);
        // Every counter grows by one per second; localTime by 1000 ms.
        let series: Vec<Vec<u64>> = schema
            .paths
            .iter()
            .zip(&schema.values)
            .map(|(path, &v)| {
                let step = if path.ends_with("localTime") || path == "start" || path == "end" {
                    1000
                } else if path.ends_with("pid") || path.ends_with("bits") {
                    0
                } else {
                    1
                };
                (0..3).map(|i| v + i * step).collect()
            })
            .collect();
        let buf = capture(&[chunk_envelope(compress_block(&build_block(&reference, &series)))]);
        let decoded = decode_buffer(&buf, &DecodeOptions::default()).unwrap();

        let attribs = Attribs::new(&decoded.blocks[0]);
        let samples: Vec<_> = attribs.samples().collect();
        assert_eq!(samples.len(), 3);

        let (ss, sm) = &samples[2];
        assert_eq!(ss.local_time.timestamp_millis(), 1_600_000_002_000);
        assert_eq!(ss.uptime, 3602);
        assert_eq!(ss.pid, 4242);
        assert_eq!(ss.mem.resident, 1026);
        assert_eq!(ss.connections.current, 12);
        assert_eq!(ss.opcounters.query, 202);
        assert_eq!(ss.op_latencies.reads.ops, 12);
        assert_eq!(ss.wired_tiger.cache.max_bytes_configured, (2 << 30) + 2);
        assert_eq!(sm.start, ss.local_time);
        assert_eq!(sm.cpu.idle_ms, 8002);
        assert_eq!(sm.disks["sda"].reads, 12);
    }
}
