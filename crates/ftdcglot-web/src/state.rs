//! Shared application state.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::{Arc, RwLock};

use ftdcglot_core::diagnostic::LoadOptions;
use ftdcglot_core::grafana::FtdcStats;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) stats: Arc<RwLock<FtdcStats>>,
    /// Options for directories loaded through `/grafana/dir`.
    pub(crate) load: LoadOptions,
    /// Held for a whole `/grafana/dir` load so two loads never race on the swap.
    pub(crate) loading: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub(crate) fn new(stats: FtdcStats, load: LoadOptions) -> Self {
        Self {
            stats: Arc::new(RwLock::new(stats)),
            load,
            loading: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}
