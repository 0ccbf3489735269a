//! Feature assembly: turns a sparse (driver, team, event, segment) query
//! into the exact ordered record the model was trained on.
//!
//! Column order and the categorical/numeric split are part of the model
//! contract and live in [`FeatureSchema`] only.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::PredictError;
use crate::reference::{ReferenceRow, ReferenceStore, TrackStat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Categorical,
    Numeric,
}

/// Every column any schema revision has used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Driver,
    Team,
    Compound,
    Event,
    Session,
    QualiSegment,
    CircuitName,
    Country,
    TrackType,
    LapSpeedClass,
    DriverTrack,
    TeamTrack,
    TyreLife,
    SpeedI1,
    SpeedI2,
    SpeedFL,
    SpeedST,
    TrackLength,
    NumCorners,
    CornerDensity,
    AvgCornerSpacing,
    AirTemp,
    TrackTemp,
    WindSpeed,
    Altitude,
    DrsZones,
    DriverTrackAvgDelta,
    DriverTrackStdDelta,
    TeamTrackAvgDelta,
    TeamTrackStdDelta,
}

impl Feature {
    pub const ALL: [Feature; 30] = [
        Feature::Driver,
        Feature::Team,
        Feature::Compound,
        Feature::Event,
        Feature::Session,
        Feature::QualiSegment,
        Feature::CircuitName,
        Feature::Country,
        Feature::TrackType,
        Feature::LapSpeedClass,
        Feature::DriverTrack,
        Feature::TeamTrack,
        Feature::TyreLife,
        Feature::SpeedI1,
        Feature::SpeedI2,
        Feature::SpeedFL,
        Feature::SpeedST,
        Feature::TrackLength,
        Feature::NumCorners,
        Feature::CornerDensity,
        Feature::AvgCornerSpacing,
        Feature::AirTemp,
        Feature::TrackTemp,
        Feature::WindSpeed,
        Feature::Altitude,
        Feature::DrsZones,
        Feature::DriverTrackAvgDelta,
        Feature::DriverTrackStdDelta,
        Feature::TeamTrackAvgDelta,
        Feature::TeamTrackStdDelta,
    ];

    /// Column name as it appeared in the training frame.
    pub fn name(self) -> &'static str {
        match self {
            Feature::Driver => "Driver",
            Feature::Team => "Team",
            Feature::Compound => "Compound",
            Feature::Event => "Event",
            Feature::Session => "Session",
            Feature::QualiSegment => "QualiSegment",
            Feature::CircuitName => "CircuitName",
            Feature::Country => "Country",
            Feature::TrackType => "TrackType",
            Feature::LapSpeedClass => "LapSpeedClass",
            Feature::DriverTrack => "DriverTrack",
            Feature::TeamTrack => "TeamTrack",
            Feature::TyreLife => "TyreLife",
            Feature::SpeedI1 => "SpeedI1",
            Feature::SpeedI2 => "SpeedI2",
            Feature::SpeedFL => "SpeedFL",
            Feature::SpeedST => "SpeedST",
            Feature::TrackLength => "TrackLength_m",
            Feature::NumCorners => "NumCorners",
            Feature::CornerDensity => "CornerDensity",
            Feature::AvgCornerSpacing => "AvgCornerSpacing_m",
            Feature::AirTemp => "AirTemp",
            Feature::TrackTemp => "TrackTemp",
            Feature::WindSpeed => "WindSpeed",
            Feature::Altitude => "Altitude_m",
            Feature::DrsZones => "DRSZones",
            Feature::DriverTrackAvgDelta => "DriverTrackAvgDelta",
            Feature::DriverTrackStdDelta => "DriverTrackStdDelta",
            Feature::TeamTrackAvgDelta => "TeamTrackAvgDelta",
            Feature::TeamTrackStdDelta => "TeamTrackStdDelta",
        }
    }

    pub fn kind(self) -> FeatureKind {
        match self {
            Feature::Driver
            | Feature::Team
            | Feature::Compound
            | Feature::Event
            | Feature::Session
            | Feature::QualiSegment
            | Feature::CircuitName
            | Feature::Country
            | Feature::TrackType
            | Feature::LapSpeedClass
            | Feature::DriverTrack
            | Feature::TeamTrack => FeatureKind::Categorical,
            _ => FeatureKind::Numeric,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .with_context(|| format!("unknown feature '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Categorical(String),
    Numeric(f64),
}

impl FeatureValue {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureValue::Categorical(_) => FeatureKind::Categorical,
            FeatureValue::Numeric(_) => FeatureKind::Numeric,
        }
    }

    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            FeatureValue::Numeric(v) => Some(*v),
            FeatureValue::Categorical(_) => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            FeatureValue::Categorical(v) => Some(v),
            FeatureValue::Numeric(_) => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Categorical(v) => f.write_str(v),
            FeatureValue::Numeric(v) => write!(f, "{v:.3}"),
        }
    }
}

/// Ordered (feature, value) pairs for a single request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureRecord {
    fields: Vec<(Feature, FeatureValue)>,
}

impl FeatureRecord {
    pub fn push(&mut self, feature: Feature, value: FeatureValue) {
        self.fields.push((feature, value));
    }

    pub fn get(&self, feature: Feature) -> Option<&FeatureValue> {
        self.fields
            .iter()
            .find(|(f, _)| *f == feature)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Feature, FeatureValue)> {
        self.fields.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(f, _)| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Which of the successive schema revisions a model was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaVersion {
    /// Absolute lap time target, no history features.
    RawLap,
    /// Delta from the session median, no history features.
    DeltaFromMedian,
    /// Delta target with driver/team track identities and history stats.
    TrackHistory,
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchemaVersion::RawLap => "raw-lap",
            SchemaVersion::DeltaFromMedian => "delta-from-median",
            SchemaVersion::TrackHistory => "track-history",
        })
    }
}

/// What the model output means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionTarget {
    LapTime,
    DeltaFromMedian,
}

/// Stats substituted when a driver or team has no history at a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackStats {
    pub avg_delta: f64,
    pub std_delta: f64,
}

impl Default for FallbackStats {
    fn default() -> Self {
        Self {
            avg_delta: 0.0,
            std_delta: 0.15,
        }
    }
}

impl From<FallbackStats> for TrackStat {
    fn from(f: FallbackStats) -> Self {
        TrackStat {
            avg_delta: f.avg_delta,
            std_delta: f.std_delta,
        }
    }
}

const BASE_FEATURES: [Feature; 24] = [
    Feature::Driver,
    Feature::Team,
    Feature::Compound,
    Feature::Event,
    Feature::Session,
    Feature::QualiSegment,
    Feature::CircuitName,
    Feature::Country,
    Feature::TrackType,
    Feature::LapSpeedClass,
    Feature::TyreLife,
    Feature::SpeedI1,
    Feature::SpeedI2,
    Feature::SpeedFL,
    Feature::SpeedST,
    Feature::TrackLength,
    Feature::NumCorners,
    Feature::CornerDensity,
    Feature::AvgCornerSpacing,
    Feature::AirTemp,
    Feature::TrackTemp,
    Feature::WindSpeed,
    Feature::Altitude,
    Feature::DrsZones,
];

/// Versioned description of the model input.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    pub version: SchemaVersion,
    pub features: Vec<Feature>,
    pub target: PredictionTarget,
    pub fallback: FallbackStats,
    /// Tyre age is not request-supplied yet; every lap is assumed fresh-ish.
    pub tyre_life: f64,
    /// Joins entity and circuit into the categorical identity value the
    /// model saw in training. Lookups use structured keys instead.
    pub identity_separator: String,
}

impl FeatureSchema {
    pub fn builtin(version: SchemaVersion) -> Self {
        let (features, target) = match version {
            SchemaVersion::RawLap => (BASE_FEATURES.to_vec(), PredictionTarget::LapTime),
            SchemaVersion::DeltaFromMedian => {
                (BASE_FEATURES.to_vec(), PredictionTarget::DeltaFromMedian)
            }
            SchemaVersion::TrackHistory => {
                // categoricals first, numerics after, as in the training frame
                let mut f: Vec<Feature> = BASE_FEATURES[..10].to_vec();
                f.extend([Feature::DriverTrack, Feature::TeamTrack]);
                f.extend_from_slice(&BASE_FEATURES[10..]);
                f.extend([
                    Feature::DriverTrackAvgDelta,
                    Feature::DriverTrackStdDelta,
                    Feature::TeamTrackAvgDelta,
                    Feature::TeamTrackStdDelta,
                ]);
                (f, PredictionTarget::DeltaFromMedian)
            }
        };
        Self {
            version,
            features,
            target,
            fallback: FallbackStats::default(),
            tyre_life: 2.0,
            identity_separator: "_".to_string(),
        }
    }

    /// Load the schema shipped next to a model artifact. Fields the file
    /// leaves out come from the built-in revision it names.
    pub fn load_meta(path: &Path, default_version: SchemaVersion) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read meta at {}", path.display()))?;
        Self::from_meta_json(&txt, default_version)
            .with_context(|| format!("invalid schema in {}", path.display()))
    }

    pub fn from_meta_json(txt: &str, default_version: SchemaVersion) -> Result<Self> {
        let meta: MetaJson = serde_json::from_str(txt).context("failed to parse meta.json")?;
        let mut schema = Self::builtin(meta.schema_version.unwrap_or(default_version));

        if let Some(list) = &meta.feat_list {
            let mut seen = HashSet::new();
            let mut features = Vec::with_capacity(list.len());
            for name in list {
                let f: Feature = name.parse()?;
                if !seen.insert(f) {
                    bail!("feature '{name}' listed twice");
                }
                features.push(f);
            }
            schema.features = features;
        }

        if let Some(cats) = &meta.cat_features {
            let declared: HashSet<&str> = cats.iter().map(String::as_str).collect();
            let expected: HashSet<&str> = schema.categorical_names().into_iter().collect();
            if declared != expected {
                let mut extra: Vec<_> = declared.difference(&expected).collect();
                let mut missing: Vec<_> = expected.difference(&declared).collect();
                extra.sort();
                missing.sort();
                bail!(
                    "cat_features disagree with feature kinds: extra={extra:?} missing={missing:?}"
                );
            }
        }

        if let Some(in_dim) = meta.in_dim {
            if in_dim != schema.features.len() {
                tracing::warn!(
                    "meta.in_dim ({}) != feat_list.len() ({}); using feat_list.len()",
                    in_dim,
                    schema.features.len()
                );
            }
        }

        if let Some(t) = meta.target {
            schema.target = t;
        }
        if let Some(fb) = meta.fallback {
            schema.fallback = fb;
        }
        if let Some(tl) = meta.tyre_life {
            schema.tyre_life = tl;
        }
        if let Some(sep) = meta.identity_separator {
            schema.identity_separator = sep;
        }

        if schema.features.is_empty() {
            bail!("schema has no features");
        }
        Ok(schema)
    }

    pub fn feature_names(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.name()).collect()
    }

    /// The explicit categorical declaration handed to the model.
    pub fn categorical_names(&self) -> Vec<&'static str> {
        self.features
            .iter()
            .filter(|f| f.kind() == FeatureKind::Categorical)
            .map(|f| f.name())
            .collect()
    }

    /// Baseline the model output is added to.
    pub fn baseline(&self, session_median_lap: f64) -> f64 {
        match self.target {
            PredictionTarget::LapTime => 0.0,
            PredictionTarget::DeltaFromMedian => session_median_lap,
        }
    }
}

#[derive(Deserialize)]
struct MetaJson {
    schema_version: Option<SchemaVersion>,
    feat_list: Option<Vec<String>>,
    cat_features: Option<Vec<String>>,
    in_dim: Option<usize>,
    target: Option<PredictionTarget>,
    fallback: Option<FallbackStats>,
    tyre_life: Option<f64>,
    identity_separator: Option<String>,
}

/// A request after driver-name resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct QualiQuery {
    pub driver: String,
    pub team: String,
    pub event: String,
    pub segment: String,
    pub compound: String,
    pub session: String,
}

impl QualiQuery {
    pub fn new(
        driver: impl Into<String>,
        team: impl Into<String>,
        event: impl Into<String>,
        segment: impl Into<String>,
    ) -> Self {
        Self {
            driver: driver.into(),
            team: team.into(),
            event: event.into(),
            segment: segment.into(),
            compound: "SOFT".to_string(),
            session: "Q".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub record: FeatureRecord,
    /// Needed by the composer, not a model input.
    pub session_median_lap: f64,
    pub driver_history: bool,
    pub team_history: bool,
}

/// Build the model input for `query`. Pure: same store, schema and query
/// always give the same record.
pub fn assemble(
    store: &ReferenceStore,
    schema: &FeatureSchema,
    query: &QualiQuery,
) -> Result<Assembled, PredictError> {
    let row = store
        .lookup_median(&query.event, &query.segment)
        .ok_or_else(|| PredictError::UnknownEventSegment {
            event: query.event.clone(),
            segment: query.segment.clone(),
        })?;

    let circuit = row.circuit_name.as_str();
    let driver_stat = store.lookup_driver_stat(&query.driver, circuit);
    let team_stat = store.lookup_team_stat(&query.team, circuit);
    if driver_stat.is_none() {
        tracing::debug!(driver = %query.driver, circuit, "no driver history, using fallback");
    }
    if team_stat.is_none() {
        tracing::debug!(team = %query.team, circuit, "no team history, using fallback");
    }

    let ctx = Sources {
        query,
        row,
        driver: driver_stat.unwrap_or_else(|| schema.fallback.into()),
        team: team_stat.unwrap_or_else(|| schema.fallback.into()),
        schema,
    };

    let mut record = FeatureRecord::default();
    for &feature in &schema.features {
        record.push(feature, ctx.value_of(feature));
    }

    Ok(Assembled {
        record,
        session_median_lap: row.session_median_lap,
        driver_history: driver_stat.is_some(),
        team_history: team_stat.is_some(),
    })
}

struct Sources<'a> {
    query: &'a QualiQuery,
    row: &'a ReferenceRow,
    driver: TrackStat,
    team: TrackStat,
    schema: &'a FeatureSchema,
}

impl Sources<'_> {
    fn identity(&self, entity: &str) -> String {
        format!(
            "{entity}{}{}",
            self.schema.identity_separator, self.row.circuit_name
        )
    }

    fn value_of(&self, feature: Feature) -> FeatureValue {
        use FeatureValue::{Categorical as C, Numeric as N};
        let (q, r) = (self.query, self.row);
        match feature {
            Feature::Driver => C(q.driver.clone()),
            Feature::Team => C(q.team.clone()),
            Feature::Compound => C(q.compound.clone()),
            Feature::Event => C(q.event.clone()),
            Feature::Session => C(q.session.clone()),
            Feature::QualiSegment => C(q.segment.clone()),
            Feature::CircuitName => C(r.circuit_name.clone()),
            Feature::Country => C(r.country.clone()),
            Feature::TrackType => C(r.track_type.clone()),
            Feature::LapSpeedClass => C(r.lap_speed_class.clone()),
            Feature::DriverTrack => C(self.identity(&q.driver)),
            Feature::TeamTrack => C(self.identity(&q.team)),
            Feature::TyreLife => N(self.schema.tyre_life),
            Feature::SpeedI1 => N(r.speed_i1),
            Feature::SpeedI2 => N(r.speed_i2),
            Feature::SpeedFL => N(r.speed_fl),
            Feature::SpeedST => N(r.speed_st),
            Feature::TrackLength => N(r.track_length_m),
            Feature::NumCorners => N(r.num_corners),
            Feature::CornerDensity => N(r.corner_density),
            Feature::AvgCornerSpacing => N(r.avg_corner_spacing_m),
            Feature::AirTemp => N(r.air_temp),
            Feature::TrackTemp => N(r.track_temp),
            Feature::WindSpeed => N(r.wind_speed),
            Feature::Altitude => N(r.altitude_m),
            Feature::DrsZones => N(r.drs_zones),
            Feature::DriverTrackAvgDelta => N(self.driver.avg_delta),
            Feature::DriverTrackStdDelta => N(self.driver.std_delta),
            Feature::TeamTrackAvgDelta => N(self.team.avg_delta),
            Feature::TeamTrackStdDelta => N(self.team.std_delta),
        }
    }
}
