//! HTTP surface for submitting jobs and polling their status.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::MAX_REQUEST_BYTES;
use crate::dispatcher::{Dispatcher, JobRequest};
use crate::registry::{JobError, JobStatus};

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
}

#[derive(Deserialize)]
struct CreateJobBody {
    input_dir: Option<PathBuf>,
    model: Option<String>,
}

#[derive(Serialize)]
struct CreateJobResponse {
    job_id: Uuid,
}

#[derive(Serialize)]
struct JobStatusResponse {
    job_id: Uuid,
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JobError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_url: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct ResultResponse {
    download_url: String,
}

#[derive(Serialize)]
struct HealthResponse {
    healthy: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_body(message: impl Into<String>) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: message.into(),
    })
}

pub fn router(state: ApiState) -> Router {
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/jobs", post(create_job_handler))
        .route("/jobs/:id/status", get(job_status_handler))
        .route("/jobs/:id/result", get(job_result_handler))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve the API until the shutdown token fires.
pub async fn run_api(addr: SocketAddr, state: ApiState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting job API server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind job API server");
            return;
        }
    };

    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });
    if let Err(e) = serve.await {
        tracing::error!(error = %e, "Job API server failed");
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { healthy: true })
}

async fn create_job_handler(
    State(state): State<ApiState>,
    Json(body): Json<CreateJobBody>,
) -> impl IntoResponse {
    let (Some(input_dir), Some(model)) = (body.input_dir, body.model) else {
        return (
            StatusCode::BAD_REQUEST,
            error_body("Missing input_dir or model in request body"),
        )
            .into_response();
    };

    if !input_dir.is_dir() {
        return (
            StatusCode::BAD_REQUEST,
            error_body(format!("input_dir is not a directory: {}", input_dir.display())),
        )
            .into_response();
    }

    let job_id = state.dispatcher.registry.create_job(model.clone()).await;
    state
        .dispatcher
        .spawn_job(job_id, JobRequest { input_dir, model });

    Json(CreateJobResponse { job_id }).into_response()
}

async fn job_status_handler(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.dispatcher.registry.snapshot(id).await {
        Ok(job) => Json(JobStatusResponse {
            job_id: job.id,
            status: job.status,
            error: job.error,
            result_url: job.result_locator,
            created_at: job.created_at,
            completed_at: job.completed_at,
        })
        .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, error_body("Job not found")).into_response(),
    }
}

async fn job_result_handler(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.dispatcher.registry.snapshot(id).await {
        Ok(job) => match (job.status, job.result_locator) {
            (JobStatus::Completed, Some(locator)) => Json(ResultResponse {
                download_url: locator,
            })
            .into_response(),
            _ => (StatusCode::BAD_REQUEST, error_body("Output not ready")).into_response(),
        },
        Err(_) => (StatusCode::NOT_FOUND, error_body("Job not found")).into_response(),
    }
}
