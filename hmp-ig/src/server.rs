//! HTTP server for hmp-ig
//!
//! Thin inbound transport: handlers never touch the session buffer or the
//! phase machine directly. Records and operator phase changes are enqueued on
//! the engine channel; status reads come from the engine's published
//! snapshot.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use hmp_common::record::RecordWire;
use hmp_common::Phase;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::{EngineMessage, EngineSnapshot};
use crate::error::{ApiError, ApiResult};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Sender half of the engine channel
    pub engine_tx: mpsc::Sender<EngineMessage>,
    /// Latest engine snapshot for /status
    pub snapshot_rx: watch::Receiver<EngineSnapshot>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        engine_tx: mpsc::Sender<EngineMessage>,
        snapshot_rx: watch::Receiver<EngineSnapshot>,
    ) -> Self {
        Self {
            engine_tx,
            snapshot_rx,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/record", post(receive_record))
        .route("/phase", post(set_phase))
        .route("/health", get(health_check))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("HTTP server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// POST /record
///
/// Accepts one wire record and enqueues it for the engine. Validation lives
/// in the engine, in one place; this handler only guards the channel.
async fn receive_record(
    State(state): State<AppState>,
    Json(wire): Json<RecordWire>,
) -> ApiResult<StatusCode> {
    enqueue(&state, EngineMessage::Record(wire))?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /phase request body
#[derive(Debug, Deserialize)]
struct SetPhaseRequest {
    phase: Phase,
}

/// POST /phase
///
/// Operator hand-off: requests a phase change, applied by the engine between
/// records. This is how development is entered and left.
async fn set_phase(
    State(state): State<AppState>,
    Json(request): Json<SetPhaseRequest>,
) -> ApiResult<StatusCode> {
    enqueue(&state, EngineMessage::SetPhase(request.phase))?;
    Ok(StatusCode::ACCEPTED)
}

fn enqueue(state: &AppState, message: EngineMessage) -> ApiResult<()> {
    state.engine_tx.try_send(message).map_err(|e| match e {
        TrySendError::Full(_) => ApiError::Unavailable("ingestion channel full".to_string()),
        TrySendError::Closed(_) => ApiError::Unavailable("ingestion engine stopped".to_string()),
    })
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    module: String,
    version: String,
    uptime_seconds: u64,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "hmp-ig".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    })
}

/// GET /status
///
/// Engine snapshot: current phase, rolling counter, buffer depth, counters.
async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.snapshot_rx.borrow().clone();
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(serde_json::json!({
        "service": "hmp-ig",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime.num_seconds().max(0),
        "engine": snapshot,
    }))
}
