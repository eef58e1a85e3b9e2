//! REST API server for the crosswalk engine
//!
//! Opens jobs, runs the generation loop, serves accepted documents, and
//! exposes the arithmetic tools as verification oracles.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::CrosswalkGenerator;
use crate::error::CrosswalkError;
use crate::models::{ToolInput, UserInput};
use crate::state;
use crate::tools::{create_default_registry, ToolRegistry};

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn with_data(mut self, data: Option<Value>) -> Self {
        self.data = data;
        self
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub generator: Arc<CrosswalkGenerator>,
    pub tools: Arc<ToolRegistry>,
}

/// =============================
/// Error Mapping
/// =============================

fn error_status(error: &CrosswalkError) -> StatusCode {
    match error {
        CrosswalkError::InvalidInput(_)
        | CrosswalkError::InvalidToolInput(_)
        | CrosswalkError::DivisionError(_)
        | CrosswalkError::ArithmeticOverflow(_)
        | CrosswalkError::UuidError(_) => StatusCode::BAD_REQUEST,
        CrosswalkError::AlreadyAccepted { .. } => StatusCode::CONFLICT,
        CrosswalkError::NotFound { .. } | CrosswalkError::ToolNotFound(_) => StatusCode::NOT_FOUND,
        CrosswalkError::RetryBudgetExhausted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CrosswalkError::TransportFault(_) | CrosswalkError::HttpError(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_details(error: &CrosswalkError) -> Option<Value> {
    match error {
        CrosswalkError::InvalidInput(violations) => Some(json!({ "violations": violations })),
        CrosswalkError::RetryBudgetExhausted {
            attempts,
            last_failure,
        } => Some(json!({
            "attempts": attempts,
            "last_outcome": last_failure.outcome(),
            "violations": last_failure.violations(),
        })),
        CrosswalkError::IntegrityError { failure, .. } => {
            Some(json!({ "violations": failure.violations() }))
        }
        _ => None,
    }
}

fn error_response(error: CrosswalkError) -> ApiResult {
    let status = error_status(&error);
    if status.is_server_error() {
        warn!(%status, "Request failed: {}", error);
    }
    (
        status,
        Json(ApiResponse::error(error.to_string()).with_data(error_details(&error))),
    )
}

fn parse_job_id(raw: &str) -> Result<Uuid, ApiResult> {
    Uuid::parse_str(raw).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("Invalid job id {:?}: {}", raw, e))),
        )
    })
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "backend": state.generator.backend_name(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Job Endpoints
/// =============================

async fn create_job(State(state): State<ApiState>, Json(body): Json<Value>) -> ApiResult {
    let input = match UserInput::parse(body) {
        Ok(input) => input,
        Err(violations) => return error_response(CrosswalkError::InvalidInput(violations)),
    };

    match state::create_job(state.generator.store().as_ref(), input).await {
        Ok(job_id) => (
            StatusCode::OK,
            Json(ApiResponse::success(json!({
                "job_id": job_id,
                "status": "created",
            }))),
        ),
        Err(e) => error_response(e),
    }
}

async fn generate_crosswalk(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> ApiResult {
    let job_id = match parse_job_id(&job_id) {
        Ok(job_id) => job_id,
        Err(rejection) => return rejection,
    };
    info!(job_id = %job_id, "Received crosswalk generation request");

    match state.generator.run(job_id).await {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))),
        Err(e) => error_response(e),
    }
}

async fn get_crosswalk(State(state): State<ApiState>, Path(job_id): Path<String>) -> ApiResult {
    let job_id = match parse_job_id(&job_id) {
        Ok(job_id) => job_id,
        Err(rejection) => return rejection,
    };

    match state::load(state.generator.store().as_ref(), job_id).await {
        Ok(document) => (StatusCode::OK, Json(ApiResponse::success(document))),
        Err(e) => error_response(e),
    }
}

/// =============================
/// Tool Endpoint
/// =============================

async fn run_tool(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(parameters): Json<Value>,
) -> ApiResult {
    let Some(tool) = state.tools.get(&name) else {
        return error_response(CrosswalkError::ToolNotFound(name));
    };

    let input = ToolInput {
        tool_name: name,
        parameters,
    };
    match tool.execute(&input).await {
        Ok(output) => (StatusCode::OK, Json(ApiResponse::success(output))),
        Err(e) => error_response(e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(generator: Arc<CrosswalkGenerator>) -> Router {
    let state = ApiState {
        generator,
        tools: Arc::new(create_default_registry()),
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/jobs", post(create_job))
        .route(
            "/api/jobs/:job_id/crosswalk",
            post(generate_crosswalk).get(get_crosswalk),
        )
        .route("/api/tools/:name", post(run_tool))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    generator: Arc<CrosswalkGenerator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(generator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
