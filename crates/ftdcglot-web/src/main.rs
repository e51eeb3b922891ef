mod handlers;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::routing::{get, post};
use clap::Parser;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use ftdcglot_core::diagnostic::{DiagnosticData, LoadOptions};
use ftdcglot_core::grafana::FtdcStats;

use state::AppState;

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(name = "ftdcglot-web", about = "Grafana JSON datasource for MongoDB FTDC data", version = ftdcglot_core::VERSION)]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "0.0.0.0:5408", env = "FTDCGLOT_LISTEN")]
    listen: String,

    /// Only read the newest N files of each directory (0 = all).
    #[arg(long, default_value = "0", env = "FTDCGLOT_LATEST")]
    latest: usize,

    /// Show the hostname in the host_info table.
    #[arg(long)]
    show_hostname: bool,

    /// diagnostic.data directories or metrics.* files to load at startup.
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("ftdcglot_web=info,ftdcglot_core=info")
            }),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            std::process::exit(1);
        }
    };
    runtime.block_on(async_main(args));
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::handle_hello))
        .route("/grafana", get(handlers::handle_hello).post(handlers::handle_hello))
        .route("/grafana/search", post(handlers::handle_search))
        .route("/grafana/query", post(handlers::handle_query))
        .route("/grafana/dir", post(handlers::handle_dir))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
}

async fn async_main(args: Args) {
    info!(
        version = ftdcglot_core::VERSION,
        build_target = ftdcglot_core::BUILD_TARGET,
        "starting"
    );
    let load = LoadOptions {
        latest: args.latest,
        ..Default::default()
    };

    let mut stats = FtdcStats::default();
    stats.show_hostname = args.show_hostname;
    if !args.paths.is_empty() {
        match DiagnosticData::load(&args.paths, &load) {
            Ok(diag) => {
                stats.merge(diag);
                for endpoint in stats.endpoints() {
                    info!("dashboard: {endpoint}");
                }
            }
            Err(e) => warn!(error = %e, "no data loaded at startup"),
        }
    }

    let app = router(AppState::new(stats, load));

    let addr: SocketAddr = match args.listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(listen = %args.listen, error = %e, "invalid listen address");
            std::process::exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(%addr, "listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
    }
}
