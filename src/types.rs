use serde::{Deserialize, Serialize};

use crate::compose::PredictionResult;

fn default_compound() -> String {
    "SOFT".to_string()
}

fn default_session() -> String {
    "Q".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    /// Full name ("Max Verstappen") or timing code ("VER").
    pub driver: String,
    pub team: String,
    pub event: String,
    #[serde(alias = "segment")]
    pub quali_segment: String,
    #[serde(default = "default_compound")]
    pub compound: String,
    #[serde(default = "default_session")]
    pub session: String,
    /// Overrides the real-lap table for back-testing.
    #[serde(default)]
    pub real_lap_time_sec: Option<f64>,
}

impl PredictRequest {
    pub fn new(
        driver: impl Into<String>,
        team: impl Into<String>,
        event: impl Into<String>,
        quali_segment: impl Into<String>,
    ) -> Self {
        Self {
            driver: driver.into(),
            team: team.into(),
            event: event.into(),
            quali_segment: quali_segment.into(),
            compound: default_compound(),
            session: default_session(),
            real_lap_time_sec: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictResponse {
    pub driver: String,
    pub event: String,
    pub segment: String,
    #[serde(flatten)]
    pub result: PredictionResult,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
