//! `serverStatus` counters of one sample.
//!
//! Field docs name the flattened metric path each value is read from,
//! relative to `serverStatus/`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resident and virtual memory, in MiB.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct MemStats {
    /// Path: `mem/resident`
    pub resident: u64,
    /// Path: `mem/virtual`
    pub virtual_mb: u64,
}

/// Network traffic counters (cumulative).
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct NetworkStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub num_requests: u64,
    /// Path: `network/physicalBytesIn` (compressed wire bytes, 3.6+).
    pub physical_bytes_in: u64,
    pub physical_bytes_out: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ConnectionStats {
    pub current: u64,
    pub available: u64,
    /// Path: `connections/totalCreated` (cumulative).
    pub total_created: u64,
    /// Path: `connections/active` (3.6+).
    pub active: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ExtraInfo {
    /// Path: `extra_info/page_faults` (cumulative).
    pub page_faults: u64,
}

/// Readers/writers pair used by `globalLock/activeClients` and
/// `globalLock/currentQueue`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct LockQueue {
    pub total: u64,
    pub readers: u64,
    pub writers: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct GlobalLock {
    /// Path: `globalLock/totalTime` (microseconds since startup).
    pub total_time: u64,
    pub active_clients: LockQueue,
    pub current_queue: LockQueue,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct QueryExecutorMetrics {
    /// Path: `metrics/queryExecutor/scanned` (index keys examined).
    pub scanned: u64,
    pub scanned_objects: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct OperationMetrics {
    /// Path: `metrics/operation/scanAndOrder` (in-memory sorts).
    pub scan_and_order: u64,
    pub write_conflicts: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DocumentMetrics {
    pub deleted: u64,
    pub inserted: u64,
    pub returned: u64,
    pub updated: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Metrics {
    pub query_executor: QueryExecutorMetrics,
    pub operation: OperationMetrics,
    pub document: DocumentMetrics,
}

/// Cumulative operation counters.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct OpCounters {
    pub command: u64,
    pub delete: u64,
    pub getmore: u64,
    pub insert: u64,
    pub query: u64,
    pub update: u64,
}

impl OpCounters {
    pub fn total(&self) -> u64 {
        self.command
            .wrapping_add(self.delete)
            .wrapping_add(self.getmore)
            .wrapping_add(self.insert)
            .wrapping_add(self.query)
            .wrapping_add(self.update)
    }
}

/// Cumulative latency (microseconds) and operation count of one class.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct OpLatency {
    pub latency: u64,
    pub ops: u64,
}

impl OpLatency {
    /// Average latency per operation in milliseconds, 0 when there were no ops.
    pub fn avg_ms(&self) -> f64 {
        if self.ops == 0 {
            0.0
        } else {
            self.latency as f64 / self.ops as f64 / 1000.0
        }
    }
}

/// Path: `opLatencies/{commands,reads,writes}` (3.2+).
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct OpLatencies {
    pub commands: OpLatency,
    pub reads: OpLatency,
    pub writes: OpLatency,
}

/// Path: `wiredTiger/block-manager/*`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct BlockManagerStats {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub bytes_written_checkpoint: u64,
}

/// Path: `wiredTiger/cache/*`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CacheStats {
    pub bytes_read_into_cache: u64,
    pub bytes_written_from_cache: u64,
    pub currently_in_cache: u64,
    pub max_bytes_configured: u64,
    pub modified_pages_evicted: u64,
    pub unmodified_pages_evicted: u64,
    pub tracked_dirty_bytes: u64,
}

/// Path: `wiredTiger/data-handle/*`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DataHandleStats {
    pub active: u64,
    pub size: u64,
}

/// Read or write ticket counters.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TicketStats {
    pub available: u64,
    pub out: u64,
    pub total_tickets: u64,
}

/// Path: `wiredTiger/concurrentTransactions/{read,write}`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ConcurrentTransactions {
    pub read: TicketStats,
    pub write: TicketStats,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct WiredTigerStats {
    pub block_manager: BlockManagerStats,
    pub cache: CacheStats,
    pub data_handle: DataHandleStats,
    pub concurrent_transactions: ConcurrentTransactions,
}

/// Path: `tcmalloc/generic/*`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TcmallocGeneric {
    pub current_allocated_bytes: u64,
    pub heap_size: u64,
}

/// Path: `tcmalloc/tcmalloc/*`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TcmallocDetail {
    pub pageheap_free_bytes: u64,
    pub pageheap_unmapped_bytes: u64,
    pub max_total_thread_cache_bytes: u64,
    pub current_total_thread_cache_bytes: u64,
    pub total_free_bytes: u64,
    pub central_cache_free_bytes: u64,
    pub transfer_cache_free_bytes: u64,
    pub thread_cache_free_bytes: u64,
    pub aggressive_memory_decommit: u64,
    pub pageheap_committed_bytes: u64,
    pub pageheap_scavenge_count: u64,
    pub pageheap_commit_count: u64,
    pub pageheap_total_commit_bytes: u64,
    pub pageheap_decommit_count: u64,
    pub pageheap_total_decommit_bytes: u64,
    pub pageheap_reserve_count: u64,
    pub pageheap_total_reserve_bytes: u64,
    pub spinlock_total_delay_ns: u64,
    pub release_rate: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TcmallocStats {
    pub generic: TcmallocGeneric,
    pub tcmalloc: TcmallocDetail,
}

/// One `serverStatus` sample.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ServerStatus {
    /// Path: `localTime` (server wall clock, millisecond precision).
    pub local_time: DateTime<Utc>,
    /// Path: `uptime` (seconds).
    pub uptime: u64,
    /// Path: `pid`. Changes when the process restarts.
    pub pid: u64,
    pub mem: MemStats,
    pub network: NetworkStats,
    pub connections: ConnectionStats,
    pub extra_info: ExtraInfo,
    pub global_lock: GlobalLock,
    pub metrics: Metrics,
    pub op_latencies: OpLatencies,
    pub opcounters: OpCounters,
    pub wired_tiger: WiredTigerStats,
    pub tcmalloc: TcmallocStats,
}

impl ServerStatus {
    /// True when `self` belongs to a new process instance compared to `prev`.
    ///
    /// A pid of 0 means the counter was absent and is not compared.
    pub fn restarted_since(&self, prev: &ServerStatus) -> bool {
        self.uptime < prev.uptime || (self.pid != 0 && prev.pid != 0 && self.pid != prev.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avg_latency_ms() {
        let lat = OpLatency {
            latency: 50_000,
            ops: 10,
        };
        assert_eq!(lat.avg_ms(), 5.0);
        assert_eq!(OpLatency::default().avg_ms(), 0.0);
    }

    #[test]
    fn test_opcounters_total() {
        let ops = OpCounters {
            command: 1,
            delete: 2,
            getmore: 3,
            insert: 4,
            query: 5,
            update: 6,
        };
        assert_eq!(ops.total(), 21);
    }

    #[test]
    fn test_restart_detection() {
        let prev = ServerStatus {
            uptime: 100,
            pid: 42,
            ..Default::default()
        };
        let same = ServerStatus {
            uptime: 101,
            pid: 42,
            ..Default::default()
        };
        let uptime_drop = ServerStatus {
            uptime: 3,
            pid: 42,
            ..Default::default()
        };
        let new_pid = ServerStatus {
            uptime: 200,
            pid: 43,
            ..Default::default()
        };
        let no_pid = ServerStatus {
            uptime: 101,
            pid: 0,
            ..Default::default()
        };
        assert!(!same.restarted_since(&prev));
        assert!(uptime_drop.restarted_since(&prev));
        assert!(new_pid.restarted_since(&prev));
        assert!(!no_pid.restarted_since(&prev));
    }
}
