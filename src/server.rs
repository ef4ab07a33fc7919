//! HTTP trigger for scheduled runs.
//!
//! A scheduler (cron job, timer function, CI workflow) starts a run by calling
//! `POST /run`; the response body is the [`RunReport`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/run` | Run the pipeline once in discovery mode. Optional `?limit=N` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "discovery_failed", "message": "source page ... returned HTTP 503" } }
//! ```
//!
//! Error codes: `discovery_failed` (502), `ledger_error` (500), `internal` (500).
//! Per-document failures are not errors here; they are reported inside the
//! `RunReport` with a 200 status.
//!
//! Runs are serialized: a second `POST /run` waits until the first finishes,
//! so the ledger has a single writer within the process.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::{self, RunReport};
use crate::progress::ProgressMode;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    /// Held for the duration of a run.
    run_lock: Arc<Mutex<()>>,
}

/// Builds the router. Exposed separately from [`run_server`] so tests can
/// serve it on an ephemeral port.
pub fn router(config: Config) -> Router {
    let state = AppState {
        config: Arc::new(config),
        run_lock: Arc::new(Mutex::new(())),
    };

    Router::new()
        .route("/health", get(handle_health))
        .route("/run", post(handle_run))
        .with_state(state)
}

/// Binds to `[server].bind` and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(config.clone());

    println!("bulletin trigger listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Maps a run-level failure to the most specific status code.
fn classify_run_error(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    let (status, code) = match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Discovery(_)) => (StatusCode::BAD_GATEWAY, "discovery_failed"),
        Some(PipelineError::Ledger(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "ledger_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    AppError {
        status,
        code: code.to_string(),
        message,
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /run ============

#[derive(Debug, Deserialize, Default)]
struct RunParams {
    limit: Option<usize>,
}

async fn handle_run(
    State(state): State<AppState>,
    Query(params): Query<RunParams>,
) -> Result<Json<RunReport>, AppError> {
    let _guard = state.run_lock.lock().await;
    info!(limit = ?params.limit, "run triggered over HTTP");

    match pipeline::execute(&state.config, None, params.limit, ProgressMode::Off).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            error!(error = %format!("{:#}", e), "triggered run failed");
            Err(classify_run_error(e))
        }
    }
}
