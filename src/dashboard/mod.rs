use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::agency::{Agency, Transaction};
use crate::error::SupervisionError;
use crate::supervision::overview::blocked_shards;
use crate::supervision::{abort_job, list_jobs, list_servers, JobSummary, ServerSummary};

#[derive(Clone)]
pub struct DashboardState {
    pub agency: Arc<dyn Agency>,
    pub prefix: String,
}

#[derive(Serialize)]
struct ServersResponse {
    servers: Vec<ServerSummary>,
    blocked_shards: Vec<BlockedShard>,
}

#[derive(Serialize)]
struct BlockedShard {
    shard: String,
    job_id: String,
}

#[derive(Serialize)]
struct AbortResponse {
    job_id: String,
    aborted: bool,
}

fn error_response(status: StatusCode, error: SupervisionError) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": error.to_string() })))
}

fn store_error(error: SupervisionError) -> (StatusCode, Json<Value>) {
    tracing::warn!(error = %error, "Dashboard request failed");
    error_response(StatusCode::SERVICE_UNAVAILABLE, error)
}

/// Routes of the dashboard and the agency write API.
pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/jobs", get(list_jobs_handler))
        .route("/api/jobs/:id/abort", post(abort_job_handler))
        .route("/api/servers", get(list_servers_handler))
        .route("/api/agency", get(agency_handler))
        .route("/_api/agency/write", post(agency_write_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn list_jobs_handler(
    State(state): State<DashboardState>,
) -> Result<Json<Vec<JobSummary>>, (StatusCode, Json<Value>)> {
    let snapshot = state.agency.read(&state.prefix).map_err(store_error)?;
    Ok(Json(list_jobs(&snapshot, Utc::now())))
}

async fn abort_job_handler(
    State(state): State<DashboardState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match abort_job(state.agency.as_ref(), &state.prefix, &job_id) {
        Ok(true) => (
            StatusCode::OK,
            Json(json!(AbortResponse { job_id, aborted: true })),
        ),
        Ok(false) => (
            StatusCode::CONFLICT,
            Json(json!(AbortResponse { job_id, aborted: false })),
        ),
        Err(e) if e.is_retryable() => store_error(e),
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e),
    }
}

async fn list_servers_handler(
    State(state): State<DashboardState>,
) -> Result<Json<ServersResponse>, (StatusCode, Json<Value>)> {
    let snapshot = state.agency.read(&state.prefix).map_err(store_error)?;
    Ok(Json(ServersResponse {
        servers: list_servers(&snapshot),
        blocked_shards: blocked_shards(&snapshot)
            .into_iter()
            .map(|(shard, job_id)| BlockedShard { shard, job_id })
            .collect(),
    }))
}

async fn agency_handler(
    State(state): State<DashboardState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let snapshot = state.agency.read(&state.prefix).map_err(store_error)?;
    Ok(Json(snapshot.into_value()))
}

/// Applies a batch of wire-format transactions. Paths are absolute.
async fn agency_write_handler(
    State(state): State<DashboardState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let Some(batch) = body.as_array() else {
        return error_response(
            StatusCode::BAD_REQUEST,
            SupervisionError::malformed("request body", "array of transactions"),
        );
    };

    let transactions = match batch.iter().map(Transaction::from_wire).collect::<Result<Vec<_>, _>>() {
        Ok(transactions) => transactions,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    match state.agency.transact(&transactions) {
        Ok(result) => {
            tracing::debug!(
                transactions = transactions.len(),
                accepted = result.accepted,
                "Agency write via HTTP"
            );
            let status = if result.accepted {
                StatusCode::OK
            } else {
                StatusCode::PRECONDITION_FAILED
            };
            (status, Json(json!(result)))
        }
        Err(e) => store_error(e),
    }
}
