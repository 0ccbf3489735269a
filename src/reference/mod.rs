//! Reference store: circuit/session medians plus per-circuit driver and
//! team history, loaded once at startup and read-only afterwards.

mod drivers;
mod tables;

pub use drivers::resolve_driver;
pub use tables::{
    DriverStatRow, DriverTrackStat, RealLapRow, ReferenceRow, TeamStatRow, TeamTrackStat,
    TrackKey, TrackStat,
};

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};

/// Locations of the tabular sources.
#[derive(Debug, Clone)]
pub struct TablePaths {
    pub medians: PathBuf,
    pub driver_stats: PathBuf,
    pub team_stats: PathBuf,
    /// Missing file means no ground truth, not a startup failure.
    pub real_laps: Option<PathBuf>,
}

/// Distinct values clients may send, for input validation on their side.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreMetadata {
    pub drivers: Vec<String>,
    pub teams: Vec<String>,
    pub events: Vec<String>,
    pub segments: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ReferenceStore {
    medians: HashMap<(String, String), ReferenceRow>,
    driver_stats: HashMap<TrackKey, DriverTrackStat>,
    team_stats: HashMap<TrackKey, TeamTrackStat>,
    real_laps: HashMap<(String, String), f64>,
}

impl ReferenceStore {
    pub fn load(paths: &TablePaths) -> Result<Self> {
        let medians = read_csv_file::<ReferenceRow>(&paths.medians)?;
        let drivers = read_csv_file::<DriverStatRow>(&paths.driver_stats)?;
        let teams = read_csv_file::<TeamStatRow>(&paths.team_stats)?;
        let real_laps = match &paths.real_laps {
            Some(p) if p.exists() => read_csv_file::<RealLapRow>(p)?,
            Some(p) => {
                tracing::warn!("real lap table {} not found; delta_sec will be null", p.display());
                Vec::new()
            }
            None => Vec::new(),
        };

        let store = Self::from_rows(medians, drivers, teams, real_laps)?;
        tracing::info!(
            "reference store loaded: medians={} driver_stats={} team_stats={} real_laps={}",
            store.medians.len(),
            store.driver_stats.len(),
            store.team_stats.len(),
            store.real_laps.len()
        );
        Ok(store)
    }

    /// Build a store from already-parsed rows. Shares validation with `load`.
    pub fn from_rows(
        medians: Vec<ReferenceRow>,
        drivers: Vec<DriverStatRow>,
        teams: Vec<TeamStatRow>,
        real_laps: Vec<RealLapRow>,
    ) -> Result<Self> {
        let mut median_map = HashMap::with_capacity(medians.len());
        for row in medians {
            let key = (row.event.clone(), row.segment.clone());
            if median_map.contains_key(&key) {
                bail!(
                    "duplicate median row for event '{}' segment '{}'",
                    key.0,
                    key.1
                );
            }
            median_map.insert(key, row);
        }

        let driver_stats = index_stats(drivers.iter().map(Into::into), "driver")?;
        let team_stats = index_stats(teams.iter().map(Into::into), "team")?;

        // first row wins, matching how back-test sheets are exported
        let mut real_map = HashMap::new();
        for row in real_laps {
            real_map
                .entry((row.driver, row.race))
                .or_insert(row.real_time_seconds);
        }

        Ok(Self {
            medians: median_map,
            driver_stats,
            team_stats,
            real_laps: real_map,
        })
    }

    /// Exact-match lookup on (event, segment).
    pub fn lookup_median(&self, event: &str, segment: &str) -> Option<&ReferenceRow> {
        self.medians.get(&(event.to_string(), segment.to_string()))
    }

    pub fn lookup_driver_stat(&self, driver: &str, circuit: &str) -> Option<DriverTrackStat> {
        self.driver_stats.get(&TrackKey::new(driver, circuit)).copied()
    }

    pub fn lookup_team_stat(&self, team: &str, circuit: &str) -> Option<TeamTrackStat> {
        self.team_stats.get(&TrackKey::new(team, circuit)).copied()
    }

    pub fn lookup_real_lap(&self, driver: &str, event: &str) -> Option<f64> {
        self.real_laps
            .get(&(driver.to_string(), event.to_string()))
            .copied()
    }

    /// Any median row, in a stable order. Used for the startup warmup.
    pub fn first_median(&self) -> Option<&ReferenceRow> {
        self.medians
            .iter()
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, row)| row)
    }

    pub fn metadata(&self) -> StoreMetadata {
        let drivers: BTreeSet<&str> = self
            .driver_stats
            .keys()
            .map(|k| k.entity.as_str())
            .chain(self.real_laps.keys().map(|(d, _)| d.as_str()))
            .collect();
        let teams: BTreeSet<&str> = self.team_stats.keys().map(|k| k.entity.as_str()).collect();
        let events: BTreeSet<&str> = self.medians.keys().map(|(e, _)| e.as_str()).collect();
        let segments: BTreeSet<&str> = self.medians.keys().map(|(_, s)| s.as_str()).collect();

        fn owned(set: BTreeSet<&str>) -> Vec<String> {
            set.into_iter().map(str::to_owned).collect()
        }

        StoreMetadata {
            drivers: owned(drivers),
            teams: owned(teams),
            events: owned(events),
            segments: owned(segments),
        }
    }
}

fn index_stats(
    rows: impl Iterator<Item = (TrackKey, TrackStat)>,
    what: &str,
) -> Result<HashMap<TrackKey, TrackStat>> {
    let mut map = HashMap::new();
    for (key, stat) in rows {
        if !stat.avg_delta.is_finite() || !stat.std_delta.is_finite() {
            bail!(
                "non-finite {what} stat for '{}' at '{}'",
                key.entity,
                key.circuit
            );
        }
        if map.insert(key.clone(), stat).is_some() {
            bail!(
                "duplicate {what} stat for '{}' at '{}'",
                key.entity,
                key.circuit
            );
        }
    }
    Ok(map)
}

fn read_csv_file<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open reference table {}", path.display()))?;
    read_csv(file).with_context(|| format!("malformed reference table {}", path.display()))
}

/// Deserialize every record of a headered CSV source.
pub fn read_csv<T: DeserializeOwned, R: io::Read>(source: R) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);
    let mut out = Vec::new();
    for (i, rec) in rdr.deserialize::<T>().enumerate() {
        // +2: header line, 1-based
        out.push(rec.with_context(|| format!("bad record at line {}", i + 2))?);
    }
    Ok(out)
}
