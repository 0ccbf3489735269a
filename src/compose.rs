use serde::Serialize;

/// Rounded outputs of one prediction, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    pub predicted_lap_time_sec: f64,
    pub real_lap_time_sec: Option<f64>,
    /// predicted - real; back-testing only, never fed to the model.
    pub delta_sec: Option<f64>,
}

/// Round to milliseconds on the exact decimal value of `x`, so a stored
/// 1.0005 (really 1.000499...) rounds down. Scaling by 1000 first would
/// round it up.
pub fn round3(x: f64) -> f64 {
    format!("{x:.3}").parse().unwrap_or(x)
}

/// Add the predicted delta to the session baseline and, when ground
/// truth is known, report the signed error.
pub fn compose(
    session_median: f64,
    predicted_delta: f64,
    real_time: Option<f64>,
) -> PredictionResult {
    let predicted = round3(session_median + predicted_delta);
    PredictionResult {
        predicted_lap_time_sec: predicted,
        real_lap_time_sec: real_time.map(round3),
        delta_sec: real_time.map(|real| round3(predicted - real)),
    }
}
