//! Host metrics (`systemMetrics/*`) of one sample.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative CPU time per state, in milliseconds.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CpuMetrics {
    pub idle_ms: u64,
    pub iowait_ms: u64,
    pub nice_ms: u64,
    pub softirq_ms: u64,
    pub steal_ms: u64,
    pub system_ms: u64,
    pub user_ms: u64,
}

impl CpuMetrics {
    /// Sum of all states.
    pub fn total_ms(&self) -> u64 {
        self.idle_ms
            .wrapping_add(self.iowait_ms)
            .wrapping_add(self.nice_ms)
            .wrapping_add(self.softirq_ms)
            .wrapping_add(self.steal_ms)
            .wrapping_add(self.system_ms)
            .wrapping_add(self.user_ms)
    }
}

/// Cumulative counters of one block device (`systemMetrics/disks/<dev>/*`).
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DiskMetrics {
    pub read_time_ms: u64,
    pub write_time_ms: u64,
    /// Instantaneous, not cumulative.
    pub io_in_progress: u64,
    pub io_queued_ms: u64,
    pub io_time_ms: u64,
    pub reads: u64,
    pub writes: u64,
}

/// One `systemMetrics` sample.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemMetrics {
    /// Sample time, taken from `serverStatus/localTime`.
    pub start: DateTime<Utc>,
    pub cpu: CpuMetrics,
    /// Keyed by device name; ordered for stable output.
    pub disks: BTreeMap<String, DiskMetrics>,
}
