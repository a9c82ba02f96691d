//! Route table and handlers

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AppState, LogRequest, LogResponse};
use crate::error::LogError;
use crate::stats::StatsSnapshot;

/// Last-resort message when a write task dies
const SYSTEM_ERROR: &str = "Fatal System Error";

/// Handle to control the running server
pub struct ServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Get the address the server is listening on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests to finish
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            // Ignore error if receiver is already dropped
            let _ = tx.send(());
        }
        self.task.await.context("Server task failed")?;
        Ok(())
    }
}

/// Build the route table
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/log/:logname", post(log_handler))
        .route("/stats", get(stats_handler))
        .fallback(fallback_handler)
        .with_state(state)
}

/// Start the server
///
/// # Arguments
/// * `addr` - Address to listen on; port 0 picks a free port
/// * `state` - Engine and counters shared by all handlers
///
/// # Returns
/// A `ServerHandle` that can be used to shut down the server
pub async fn start(addr: SocketAddr, state: AppState) -> Result<ServerHandle> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let bound_addr = listener.local_addr()?;

    info!("Starting server on {}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
                info!("Server shutting down");
            })
            .await;
        if let Err(e) = result {
            error!("Server error: {}", e);
        }
    });

    Ok(ServerHandle {
        shutdown_tx: Some(shutdown_tx),
        addr: bound_addr,
        task,
    })
}

/// HTTP status for an engine failure
fn status_for(err: &LogError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if err.is_capacity_error() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// POST /log/:logname handler
///
/// Parses the name and body itself so malformed input still gets the JSON envelope.
async fn log_handler(
    State(state): State<AppState>,
    logname: Result<Path<String>, PathRejection>,
    body: Bytes,
) -> (StatusCode, Json<LogResponse>) {
    state.stats.inc_requests();

    let logname = match logname {
        Ok(Path(logname)) => logname,
        Err(e) => {
            let reason = e.body_text();
            warn!("Unable to parse log name: {}", reason);
            state.stats.inc_errors();
            return (
                StatusCode::BAD_REQUEST,
                Json(LogResponse::error(format!("Invalid log name: {}", reason))),
            );
        }
    };

    let request: LogRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(stream = %logname, "Unable to parse body: {}", e);
            state.stats.inc_errors();
            return (
                StatusCode::BAD_REQUEST,
                Json(LogResponse::error(format!("Invalid request body: {}", e))),
            );
        }
    };

    debug!(stream = %logname, bytes = request.message.len(), "Received log write");

    let engine = state.engine.clone();
    let stream = logname.clone();
    let outcome =
        tokio::task::spawn_blocking(move || engine.write(&stream, &request.message)).await;

    match outcome {
        Ok(Ok(_)) => {
            state.stats.inc_logs_written();
            (StatusCode::OK, Json(LogResponse::ok()))
        }
        Ok(Err(e)) => {
            error!(stream = %logname, "Log write failed: {}", e);
            state.stats.inc_errors();
            (status_for(&e), Json(LogResponse::error(e.to_string())))
        }
        Err(e) => {
            error!(stream = %logname, "Log write task failed: {}", e);
            state.stats.inc_errors();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(LogResponse::error(SYSTEM_ERROR)),
            )
        }
    }
}

/// GET /stats handler
async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

async fn fallback_handler() -> (StatusCode, Json<LogResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(LogResponse::error("incorrect URL")),
    )
}
