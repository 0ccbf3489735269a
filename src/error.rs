use axum::http::StatusCode;
use thiserror::Error;

/// Errors a single prediction request can hit. Startup failures are not
/// in here: loaders return `anyhow::Result` and `main` refuses to serve.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictError {
    #[error("no session median for event '{event}' segment '{segment}'")]
    UnknownEventSegment { event: String, segment: String },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::UnknownEventSegment { .. } => StatusCode::NOT_FOUND,
            PredictError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PredictError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}
