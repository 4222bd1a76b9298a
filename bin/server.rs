// Fund Load Velocity Limits - Web Server
// REST API with Axum over a single shared pipeline

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use fund_load::{
    open_pipeline, AggregationStore, Block, Config, JsonChainStore, LoadRequest, Pipeline,
    PipelineError, SqliteStore, Transaction, ValidationRecord,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

/// Shared application state. The mutex serializes ledger adds and chain reads.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Mutex<Pipeline<SqliteStore, JsonChainStore>>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Error rendered as JSON with a matching status code
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ApiResponse::<()>::err(self.1))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match err {
            PipelineError::MalformedInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = error_chain(&err);
        if status != StatusCode::UNPROCESSABLE_ENTITY {
            error!(error = %message, "request failed");
        }
        ApiError(status, message)
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn poisoned() -> ApiError {
    ApiError(StatusCode::INTERNAL_SERVER_ERROR, "pipeline lock poisoned".to_string())
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/chain - Sealed blocks only
async fn get_chain(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Block>>>, ApiError> {
    let pipeline = state.pipeline.lock().map_err(|_| poisoned())?;
    Ok(Json(ApiResponse::ok(pipeline.ledger().chain().to_vec())))
}

/// POST /api/loads - Validate one load request
async fn submit_load(
    State(state): State<AppState>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<ApiResponse<ValidationRecord>>, ApiError> {
    let tx = Transaction::try_from(request).map_err(PipelineError::from)?;
    let mut pipeline = state.pipeline.lock().map_err(|_| poisoned())?;
    let record = pipeline.process(tx)?;
    Ok(Json(ApiResponse::ok(record)))
}

#[derive(Deserialize)]
struct RangeParams {
    from: Option<i64>,
    to: Option<i64>,
}

/// GET /api/customers/:customer_id/loads?from=&to= - Range query, latest first
async fn get_customer_loads(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<ApiResponse<Vec<Transaction>>>, ApiError> {
    let pipeline = state.pipeline.lock().map_err(|_| poisoned())?;
    let loads = pipeline
        .store()
        .range_query(&customer_id, params.from.unwrap_or(0), params.to.unwrap_or(i64::MAX))
        .map_err(PipelineError::from)?;
    Ok(Json(ApiResponse::ok(loads)))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config = match std::env::var("FUND_LOAD_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::default(),
    };

    let pipeline = open_pipeline(&config)?;
    let state = AppState {
        pipeline: Arc::new(Mutex::new(pipeline)),
    };

    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/chain", get(get_chain))
        .route("/api/loads", post(submit_load))
        .route("/api/customers/:customer_id/loads", get(get_customer_loads))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = std::env::var("FUND_LOAD_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "fund-load server listening");
    info!("  GET  /api/health");
    info!("  GET  /api/chain");
    info!("  POST /api/loads");
    info!("  GET  /api/customers/:customer_id/loads?from=&to=");

    axum::serve(listener, app).await?;

    Ok(())
}
