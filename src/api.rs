use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::predictor::Predictor;
use crate::reference::StoreMetadata;
use crate::types::{ErrorBody, PredictRequest, PredictResponse};

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
}

pub fn router(predictor: Arc<Predictor>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/predict", post(predict))
        .route("/metadata", get(metadata))
        .with_state(AppState { predictor })
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "F1 qualifying prediction API is running" }))
}

async fn predict(
    State(state): State<AppState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    // malformed bodies get the same `{error}` shape as pipeline failures
    let Json(req) = body.map_err(|rejection| {
        tracing::info!("predict body rejected: {}", rejection.body_text());
        error_body(rejection.status(), rejection.body_text())
    })?;

    state.predictor.predict(&req).map(Json).map_err(|e| {
        tracing::info!("predict rejected: {e}");
        error_body(e.status(), e.to_string())
    })
}

async fn metadata(State(state): State<AppState>) -> Json<StoreMetadata> {
    Json(state.predictor.metadata())
}

fn error_body(status: StatusCode, error: String) -> ApiError {
    (status, Json(ErrorBody { error }))
}
