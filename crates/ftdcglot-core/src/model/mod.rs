//! Structured per-sample records rebuilt from decoded metric series.
//!
//! - [`server_status`]: `serverStatus` counters (memory, connections, locks,
//!   opcounters, latencies, WiredTiger, tcmalloc)
//! - [`system_metrics`]: host CPU and per-device disk counters
//! - [`server_info`]: host and build description from the metadata document
//! - [`replset`]: replica-set members and optimes from each block reference
//!
//! Every counter is the raw cumulative value at one sample. Rates and deltas
//! are computed by the aggregation layers, never stored here.

mod replset;
mod server_info;
mod server_status;
mod system_metrics;

pub use replset::{
    ReplSetMember, ReplSetStatus, STATE_ARBITER, STATE_PRIMARY, STATE_SECONDARY,
};
pub use server_info::{BuildInfo, HostInfo, OsInfo, ServerInfo, SystemInfo};
pub use server_status::{
    BlockManagerStats, CacheStats, ConcurrentTransactions, ConnectionStats, DataHandleStats,
    DocumentMetrics, ExtraInfo, GlobalLock, LockQueue, MemStats, Metrics, NetworkStats,
    OpCounters, OpLatencies, OpLatency, OperationMetrics, QueryExecutorMetrics, ServerStatus,
    TcmallocDetail, TcmallocGeneric, TcmallocStats, TicketStats, WiredTigerStats,
};
pub use system_metrics::{CpuMetrics, DiskMetrics, SystemMetrics};
