//! HTTP request handlers for the Grafana JSON datasource.

use std::path::PathBuf;
use std::sync::PoisonError;

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use ftdcglot_core::diagnostic::DiagnosticData;
use ftdcglot_core::grafana::{FtdcStats, QueryRequest, QueryResult};

use crate::state::AppState;

// ============================================================
// Health
// ============================================================

pub(crate) async fn handle_hello() -> Json<Value> {
    Json(json!({"ok": 1, "message": "hello mongo-ftdc!"}))
}

// ============================================================
// Search / query
// ============================================================

pub(crate) async fn handle_search(State(state): State<AppState>) -> Json<Vec<String>> {
    let stats = state.stats.read().unwrap_or_else(PoisonError::into_inner);
    Json(stats.search())
}

/// Malformed bodies get an empty answer, which Grafana renders as "no data".
pub(crate) async fn handle_query(
    State(state): State<AppState>,
    body: String,
) -> Json<Vec<QueryResult>> {
    let req: QueryRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "invalid query request");
            return Json(Vec::new());
        }
    };
    let stats = state.stats.read().unwrap_or_else(PoisonError::into_inner);
    Json(stats.query(&req))
}

// ============================================================
// Directory loading
// ============================================================

#[derive(Deserialize)]
pub(crate) struct DirRequest {
    dir: PathBuf,
}

/// Loads another `diagnostic.data` directory and merges its newer samples.
///
/// Decoding, merging and the series rebuild run on a blocking thread against
/// a copy of the current stats. The write lock is only taken to swap the
/// result in, so searches and queries keep being served meanwhile.
pub(crate) async fn handle_dir(State(state): State<AppState>, body: String) -> Json<Value> {
    let req: DirRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => return Json(json!({"ok": 0, "err": e.to_string()})),
    };
    info!(dir = %req.dir.display(), "loading directory");

    let _loading = state.loading.lock().await;
    let opts = state.load;
    let current = state.stats.clone();
    let merged = tokio::task::spawn_blocking(move || -> ftdcglot_core::Result<FtdcStats> {
        let diag = DiagnosticData::load(&[req.dir], &opts)?;
        let mut stats = current.read().unwrap_or_else(PoisonError::into_inner).clone();
        stats.merge(diag);
        Ok(stats)
    })
    .await;
    let merged = match merged {
        Ok(Ok(stats)) => stats,
        Ok(Err(e)) => return Json(json!({"ok": 0, "err": e.to_string()})),
        Err(e) => {
            error!(error = %e, "directory load panicked");
            return Json(json!({"ok": 0, "err": e.to_string()}));
        }
    };

    let endpoints = merged.endpoints();
    let previous = {
        let mut stats = state.stats.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *stats, merged)
    };
    drop(previous);
    for endpoint in &endpoints {
        info!("dashboard: {endpoint}");
    }
    Json(json!({"ok": 1, "endpoints": endpoints.join(",")}))
}
