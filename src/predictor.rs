//! The whole pipeline behind one call: assemble, infer, compose.
//!
//! A `Predictor` owns the reference store, the schema and the model. All
//! three are immutable after construction, so one instance is shared by
//! every request without locking.

use anyhow::Context;

use crate::compose::compose;
use crate::error::PredictError;
use crate::features::{assemble, FeatureRecord, FeatureSchema, FeatureValue, QualiQuery};
use crate::model::InferenceEngine;
use crate::reference::{resolve_driver, ReferenceStore, StoreMetadata};
use crate::types::{PredictRequest, PredictResponse};

pub struct Predictor {
    store: ReferenceStore,
    schema: FeatureSchema,
    engine: InferenceEngine,
    log_features: bool,
}

impl Predictor {
    pub fn new(store: ReferenceStore, schema: FeatureSchema, engine: InferenceEngine) -> Self {
        Self {
            store,
            schema,
            engine,
            log_features: false,
        }
    }

    pub fn with_feature_logging(mut self, on: bool) -> Self {
        self.log_features = on;
        self
    }

    pub fn metadata(&self) -> StoreMetadata {
        self.store.metadata()
    }

    pub fn predict(&self, req: &PredictRequest) -> Result<PredictResponse, PredictError> {
        let query = query_from(req)?;

        let assembled = assemble(&self.store, &self.schema, &query)?;
        if self.log_features {
            log_record(&query, &assembled.record);
        }

        let delta = self.engine.predict_delta(&assembled.record)?;
        let real = req
            .real_lap_time_sec
            .or_else(|| self.store.lookup_real_lap(&query.driver, &query.event));
        let result = compose(self.schema.baseline(assembled.session_median_lap), delta, real);

        tracing::debug!(
            driver = %query.driver,
            event = %query.event,
            segment = %query.segment,
            delta,
            predicted = result.predicted_lap_time_sec,
            driver_history = assembled.driver_history,
            team_history = assembled.team_history,
            "prediction"
        );

        Ok(PredictResponse {
            driver: query.driver,
            event: query.event,
            segment: query.segment,
            result,
        })
    }

    /// One full pass over a known (event, segment) so a broken model
    /// fails before the port is bound.
    pub fn warmup(&self) -> anyhow::Result<()> {
        let row = self
            .store
            .first_median()
            .context("reference store has no median rows")?;
        let req = PredictRequest::new("warmup", "warmup", &row.event, &row.segment);
        let out = self
            .predict(&req)
            .with_context(|| format!("warmup on {} {} failed", row.event, row.segment))?;
        tracing::info!(
            "warmup ok: {} {} -> {:.3}s",
            out.event,
            out.segment,
            out.result.predicted_lap_time_sec
        );
        Ok(())
    }
}

fn log_record(query: &QualiQuery, record: &FeatureRecord) {
    let nums: Vec<f64> = record.iter().filter_map(|(_, v)| v.as_numeric()).collect();
    let nz = nums.iter().filter(|x| **x != 0.0).count();
    let sample: Vec<String> = record
        .iter()
        .take(6)
        .map(|(f, v)| match v {
            FeatureValue::Categorical(s) => format!("{f}={s}"),
            FeatureValue::Numeric(x) => format!("{f}={x:.3}"),
        })
        .collect();
    tracing::info!(
        "assembled driver={} event={} segment={} in_dim={} numeric={} nonzero={} sample=[{}]",
        query.driver,
        query.event,
        query.segment,
        record.len(),
        nums.len(),
        nz,
        sample.join(", ")
    );
}

/// Validate a request and normalise it into the lookup/model query.
fn query_from(req: &PredictRequest) -> Result<QualiQuery, PredictError> {
    for (field, value) in [
        ("driver", &req.driver),
        ("team", &req.team),
        ("event", &req.event),
        ("quali_segment", &req.quali_segment),
    ] {
        if value.trim().is_empty() {
            return Err(PredictError::InvalidRequest(format!("{field} is empty")));
        }
    }

    Ok(QualiQuery {
        driver: resolve_driver(&req.driver).to_string(),
        team: req.team.trim().to_string(),
        event: req.event.trim().to_string(),
        segment: req.quali_segment.trim().to_string(),
        compound: req.compound.trim().to_string(),
        session: req.session.trim().to_string(),
    })
}
