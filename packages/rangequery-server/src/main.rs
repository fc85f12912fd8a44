//! `rangequery-server` — the thin HTTP front-end described in
//! `spec.md` §6. Everything here is ambient plumbing: flag parsing,
//! logging, and the wire contract. The engine itself lives in
//! `rangequery_core`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use rangequery_core::store::{FileStore, HttpKvTransport, KVStore, Store, TestStore};

#[derive(Clone, Debug, ValueEnum)]
enum StoreKind {
    File,
    Kv,
    Test,
}

/// CLI surface, mirroring the original's `flag.StringVar`/`flag.BoolVar`
/// set in `rangeserver.go` (`--store`, `--params`, `--slowlog`,
/// `--fast`, `--roptimize`, `--serveraddr`) with an idiomatic `clap`
/// derive instead of hand-rolled flag parsing.
#[derive(Parser, Debug)]
#[command(name = "rangequery-server", about = "HTTP front-end for range queries")]
struct Cli {
    /// Which Store backend to serve from.
    #[arg(long, value_enum, default_value_t = StoreKind::Test)]
    store: StoreKind,

    /// FileStore root directory, or a comma-separated list of KVStore
    /// endpoints (`http://host:port,...`). Ignored for `--store test`.
    #[arg(long)]
    params: Option<String>,

    /// KVStore root prefix (spec.md §4.4 "configurable root prefix").
    #[arg(long, default_value = "/range")]
    kv_root: String,

    /// Stop reverse lookups at the first matching leaf.
    #[arg(long)]
    fast: bool,

    /// Use the KVStore `_roptimize` reverse index when available.
    #[arg(long)]
    roptimize: bool,

    /// Log (and flag) queries slower than this many microseconds.
    #[arg(long, default_value_t = 100_000)]
    slowlog: u64,

    #[arg(long, default_value = "0.0.0.0:8080")]
    serveraddr: SocketAddr,
}

struct AppState {
    store: Arc<dyn Store>,
    /// Live readiness probe. FileStore/TestStore are always ready once
    /// constructed; KVStore re-queries its sentinel.
    ready: Box<dyn Fn() -> bool + Send + Sync>,
    slowlog_us: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let (store, ready): (Arc<dyn Store>, Box<dyn Fn() -> bool + Send + Sync>) = match cli.store {
        StoreKind::File => {
            let path = cli
                .params
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--params <path> is required for --store file"))?;
            let fs = Arc::new(FileStore::open(path, None, cli.fast)?);
            (fs, Box::new(|| true))
        }
        StoreKind::Kv => {
            let endpoints: Vec<String> = cli
                .params
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--params <endpoints> is required for --store kv"))?
                .split(',')
                .map(|s| s.to_string())
                .collect();
            let transport = Box::new(HttpKvTransport::new(endpoints)?);
            let kv = Arc::new(KVStore::connect(transport, cli.kv_root.clone(), cli.roptimize, cli.fast)?);
            let kv_for_health = kv.clone();
            (kv, Box::new(move || kv_for_health.is_ready()))
        }
        StoreKind::Test => (Arc::new(TestStore::new()), Box::new(|| true)),
    };

    let state = Arc::new(AppState {
        store,
        ready,
        slowlog_us: cli.slowlog,
    });

    let app = Router::new()
        .route("/v1/range/{*expr}", get(handle_range))
        .route("/v1/range/list", get(handle_range))
        .route("/healthz", get(handle_health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    info!(addr = %cli.serveraddr, store = ?cli.store, "starting rangequery-server");
    let listener = tokio::net::TcpListener::bind(cli.serveraddr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining connections");
}

/// `GET /v1/range/...?<raw-query>` (and its `/v1/range/list` alias the
/// original CLI client `yr.go` uses). The entire raw query string is
/// the expression; axum's `RawQuery` extractor gives it to us already
/// percent-decoded once.
async fn handle_range(State(state): State<Arc<AppState>>, RawQuery(query): RawQuery) -> Response {
    let expr = query.unwrap_or_default();
    let start = Instant::now();

    // Evaluation can block on Store I/O (spec.md §5 "suspension
    // points"); run it on a blocking-pool thread so the async runtime
    // keeps serving other requests.
    let store = state.store.clone();
    let expr_for_eval = expr.clone();
    let outcome = tokio::task::spawn_blocking(move || rangequery_core::run(&expr_for_eval, store.as_ref())).await;

    let elapsed_us = start.elapsed().as_micros() as u64;

    let eval_result = match outcome {
        Ok(Ok(r)) => r,
        Ok(Err(parse_err)) => {
            warn!(query = %expr, error = %parse_err, "parse error");
            return error_response(&[parse_err.to_string()], elapsed_us, 1);
        }
        Err(join_err) => {
            // A panic inside the evaluator surfaces here rather than
            // tearing down the process (spec.md §5 "failure isolation").
            warn!(query = %expr, error = %join_err, "evaluator task panicked");
            return error_response(&["internal error".to_string()], elapsed_us, 1);
        }
    };

    if elapsed_us > state.slowlog_us {
        warn!(query = %expr, microseconds = elapsed_us, "[SLOWQUERY]");
    } else {
        info!(query = %expr, microseconds = elapsed_us, errors = eval_result.errors.len(), "query served");
    }

    if eval_result.is_err() {
        let messages: Vec<String> = eval_result.errors.iter().map(|e| e.to_string()).collect();
        return error_response(&messages, elapsed_us, eval_result.errors.len());
    }

    let mut headers = HeaderMap::new();
    headers.insert("Range-Expand-Microsecond", micros_header(elapsed_us));
    (StatusCode::OK, headers, eval_result.values.join("\n")).into_response()
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    if (state.ready)() {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

fn error_response(messages: &[String], elapsed_us: u64, err_count: usize) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Range-Expand-Microsecond", micros_header(elapsed_us));
    if err_count > 0 {
        headers.insert("Range-Err-Count", HeaderValue::from_str(&err_count.to_string()).unwrap());
    }
    (StatusCode::INTERNAL_SERVER_ERROR, headers, messages.join(",")).into_response()
}

fn micros_header(value: u64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).expect("integer formats to a valid header value")
}
