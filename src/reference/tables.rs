use serde::Deserialize;

/// One row of `circuit_medians.csv`: circuit, weather and the session
/// median for a single (event, segment).
///
/// Every numeric cell must be filled. An empty cell (a pandas NaN export)
/// fails the load with the file and line; impute before exporting.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReferenceRow {
    #[serde(rename = "Event")]
    pub event: String,
    #[serde(rename = "QualiSegment")]
    pub segment: String,
    #[serde(rename = "CircuitName")]
    pub circuit_name: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "TrackType")]
    pub track_type: String,
    #[serde(rename = "LapSpeedClass")]
    pub lap_speed_class: String,

    #[serde(rename = "SpeedI1")]
    pub speed_i1: f64,
    #[serde(rename = "SpeedI2")]
    pub speed_i2: f64,
    #[serde(rename = "SpeedFL")]
    pub speed_fl: f64,
    #[serde(rename = "SpeedST")]
    pub speed_st: f64,

    #[serde(rename = "TrackLength_m")]
    pub track_length_m: f64,
    #[serde(rename = "NumCorners")]
    pub num_corners: f64,
    #[serde(rename = "CornerDensity")]
    pub corner_density: f64,
    #[serde(rename = "AvgCornerSpacing_m")]
    pub avg_corner_spacing_m: f64,

    #[serde(rename = "AirTemp")]
    pub air_temp: f64,
    #[serde(rename = "TrackTemp")]
    pub track_temp: f64,
    #[serde(rename = "WindSpeed")]
    pub wind_speed: f64,
    #[serde(rename = "Altitude_m")]
    pub altitude_m: f64,
    #[serde(rename = "DRSZones")]
    pub drs_zones: f64,

    /// Baseline lap (seconds) the model's delta is measured against.
    #[serde(rename = "SessionMedianLap")]
    pub session_median_lap: f64,
}

/// Historical delta-from-median of a driver or team at one circuit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackStat {
    pub avg_delta: f64,
    pub std_delta: f64,
}

pub type DriverTrackStat = TrackStat;
pub type TeamTrackStat = TrackStat;

/// Structured (entity, circuit) key. Lookups never go through a joined
/// string, so a separator inside a name cannot collide two keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackKey {
    pub entity: String,
    pub circuit: String,
}

impl TrackKey {
    pub fn new(entity: impl Into<String>, circuit: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            circuit: circuit.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverStatRow {
    #[serde(rename = "Driver")]
    pub driver: String,
    #[serde(rename = "CircuitName")]
    pub circuit_name: String,
    #[serde(rename = "DriverTrackAvgDelta")]
    pub avg_delta: f64,
    #[serde(rename = "DriverTrackStdDelta")]
    pub std_delta: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamStatRow {
    #[serde(rename = "Team")]
    pub team: String,
    #[serde(rename = "CircuitName")]
    pub circuit_name: String,
    #[serde(rename = "TeamTrackAvgDelta")]
    pub avg_delta: f64,
    #[serde(rename = "TeamTrackStdDelta")]
    pub std_delta: f64,
}

/// Ground-truth qualifying lap used for back-testing.
#[derive(Debug, Clone, Deserialize)]
pub struct RealLapRow {
    pub driver: String,
    pub race: String,
    pub real_time_seconds: f64,
}

impl From<&DriverStatRow> for (TrackKey, TrackStat) {
    fn from(row: &DriverStatRow) -> Self {
        (
            TrackKey::new(&row.driver, &row.circuit_name),
            TrackStat {
                avg_delta: row.avg_delta,
                std_delta: row.std_delta,
            },
        )
    }
}

impl From<&TeamStatRow> for (TrackKey, TrackStat) {
    fn from(row: &TeamStatRow) -> Self {
        (
            TrackKey::new(&row.team, &row.circuit_name),
            TrackStat {
                avg_delta: row.avg_delta,
                std_delta: row.std_delta,
            },
        )
    }
}
