use clap::Parser;
use std::path::PathBuf;

use crate::features::SchemaVersion;
use crate::model::ModelKind;
use crate::reference::TablePaths;

/// Qualifying lap-time prediction service.
#[derive(Debug, Clone, Parser)]
#[command(name = "quali_predictor", version)]
pub struct ServiceConfig {
    /// Model artifact (forest JSON or TorchScript module)
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: PathBuf,

    #[arg(long, env = "MODEL_KIND", value_enum, default_value_t = default_model_kind())]
    pub model_kind: ModelKind,

    /// Feature schema shipped with the model; built-in schema if absent
    #[arg(long, env = "META_PATH")]
    pub meta_path: Option<PathBuf>,

    #[arg(long, env = "SCHEMA_VERSION", value_enum, default_value_t = SchemaVersion::TrackHistory)]
    pub schema_version: SchemaVersion,

    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "MEDIANS_FILE", default_value = "circuit_medians.csv")]
    pub medians_file: String,

    #[arg(long, env = "DRIVER_STATS_FILE", default_value = "driver_track_stats.csv")]
    pub driver_stats_file: String,

    #[arg(long, env = "TEAM_STATS_FILE", default_value = "team_track_stats.csv")]
    pub team_stats_file: String,

    /// Ground truth for back-testing; optional
    #[arg(long, env = "REAL_LAPS_FILE", default_value = "real_lap_time_2025.csv")]
    pub real_laps_file: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// Log a summary of every assembled feature record
    #[arg(long, env = "LOG_PRED")]
    pub log_features: bool,
}

fn default_model_kind() -> ModelKind {
    if cfg!(feature = "torch") {
        ModelKind::Torch
    } else {
        ModelKind::Forest
    }
}

impl ServiceConfig {
    pub fn table_paths(&self) -> TablePaths {
        TablePaths {
            medians: self.data_dir.join(&self.medians_file),
            driver_stats: self.data_dir.join(&self.driver_stats_file),
            team_stats: self.data_dir.join(&self.team_stats_file),
            real_laps: Some(self.data_dir.join(&self.real_laps_file)),
        }
    }
}
