//! HTTP boundary
//!
//! Thin axum layer over [`PredictionOrchestrator`]. Request bodies are parsed
//! into strict structs; anything that does not parse is rejected here and
//! never reaches the pipeline.

use crate::error::{ErrorKind, PipelineError};
use crate::orchestrator::PredictionOrchestrator;
use crate::source::RawActivitySource;
use crate::types::{BatchItem, FeatureSchema};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Shared application state available to all handlers.
pub struct AppState<S> {
    pub orchestrator: Arc<PredictionOrchestrator<S>>,
    pub max_batch_size: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl<S> AppState<S> {
    pub fn new(orchestrator: Arc<PredictionOrchestrator<S>>, max_batch_size: usize) -> Self {
        Self {
            orchestrator,
            max_batch_size,
            started_at: chrono::Utc::now(),
        }
    }
}

pub fn router<S: RawActivitySource + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/api/health", get(health::<S>))
        .route("/api/schema", get(schema::<S>))
        .route("/api/extract_features", get(extract_features::<S>))
        .route("/api/predict_risk", post(predict_risk::<S>))
        .route("/api/predict_wallets", post(predict_wallets::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error returned by a handler as a whole.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("{0}")]
    BadRequest(String),

    #[error("batch of {size} items exceeds the limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(e) => match e.kind() {
                ErrorKind::UnresolvableAddress => StatusCode::BAD_REQUEST,
                ErrorKind::DataUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::SchemaMismatch => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::ClassifierFault
                | ErrorKind::InvalidProbability
                | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        let body = match &self {
            ApiError::Pipeline(e) => {
                if status.is_server_error() || e.kind() == ErrorKind::SchemaMismatch {
                    error!(kind = e.kind().as_str(), error = %e, "Request failed");
                } else {
                    warn!(kind = e.kind().as_str(), error = %e, "Request failed");
                }
                json!({ "error": message, "kind": e.kind() })
            }
            ApiError::BadRequest(_) | ApiError::PayloadTooLarge { .. } => {
                warn!(status = status.as_u16(), error = %message, "Request rejected");
                json!({ "error": message })
            }
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    schema_version: String,
    uptime_secs: i64,
}

async fn health<S: RawActivitySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        schema_version: state.orchestrator.schema().version().to_string(),
        uptime_secs: uptime,
    })
}

async fn schema<S: RawActivitySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    Json(FeatureSchema::clone(state.orchestrator.schema()))
}

#[derive(Debug, Deserialize)]
pub struct ExtractQuery {
    pub wallet: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeaturesResponse {
    pub features: Vec<Vec<f64>>,
}

async fn extract_features<S: RawActivitySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<ExtractQuery>, QueryRejection>,
) -> Result<Json<FeaturesResponse>, ApiError> {
    let Query(query) = query?;
    let Some(wallet) = query.wallet.filter(|w| !w.trim().is_empty()) else {
        return Err(ApiError::BadRequest(
            "missing 'wallet' query parameter".to_string(),
        ));
    };

    let vector = state.orchestrator.extract(&wallet).await?;
    let row = state.orchestrator.schema().encode(&vector)?;

    Ok(Json(FeaturesResponse {
        features: vec![row],
    }))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictRiskRequest {
    pub features: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictWalletsRequest {
    pub wallets: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub results: Vec<BatchItem>,
}

async fn predict_risk<S: RawActivitySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<PredictRiskRequest>, JsonRejection>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let Json(request) = payload?;
    check_batch_size(request.features.len(), state.max_batch_size)?;

    let expected = state.orchestrator.schema().len();
    if !request.features.is_empty() && request.features.iter().all(|row| row.len() != expected) {
        return Err(PipelineError::SchemaMismatch(format!(
            "no row has the {expected} values schema '{}' expects",
            state.orchestrator.schema().version()
        ))
        .into());
    }

    let results = state.orchestrator.predict_rows(&request.features);
    Ok(Json(ResultsResponse { results }))
}

async fn predict_wallets<S: RawActivitySource + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<PredictWalletsRequest>, JsonRejection>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let Json(request) = payload?;
    check_batch_size(request.wallets.len(), state.max_batch_size)?;

    let results = state.orchestrator.predict_batch(&request.wallets).await;
    Ok(Json(ResultsResponse { results }))
}

fn check_batch_size(size: usize, limit: usize) -> Result<(), ApiError> {
    if size > limit {
        return Err(ApiError::PayloadTooLarge { size, limit });
    }
    Ok(())
}
