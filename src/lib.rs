//! Formula 1 qualifying lap-time prediction.
//!
//! A request (driver, team, event, segment) is turned into the model's
//! exact feature record, the model predicts a delta from the session
//! median, and the delta is added back to that median.

pub mod api;
pub mod compose;
pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod predictor;
pub mod reference;
pub mod types;

pub use compose::{compose, PredictionResult};
pub use error::PredictError;
pub use features::{assemble, FeatureRecord, FeatureSchema, SchemaVersion};
pub use model::{DeltaModel, InferenceEngine};
pub use predictor::Predictor;
pub use reference::ReferenceStore;
