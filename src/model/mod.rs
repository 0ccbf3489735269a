//! Inference engine: one immutable model behind the [`DeltaModel`] trait.
//!
//! The engine checks a record against the trained column list and tags
//! every categorical column explicitly before the backend sees it.

mod forest;
#[cfg(feature = "torch")]
mod torch;

pub use forest::ObliviousForest;
#[cfg(feature = "torch")]
pub use torch::TorchModel;

use anyhow::Result;
use std::path::Path;

use crate::error::PredictError;
use crate::features::{FeatureKind, FeatureRecord, FeatureSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelKind {
    /// Oblivious-tree ensemble exported as JSON.
    Forest,
    /// TorchScript module (needs the `torch` build feature).
    Torch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: FeatureKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Cat(&'a str),
    Num(f64),
}

/// A batch of exactly one row, with the categorical declaration attached.
#[derive(Debug)]
pub struct InferenceRow<'a> {
    columns: &'a [ColumnSpec],
    cells: Vec<Cell<'a>>,
}

impl<'a> InferenceRow<'a> {
    pub fn columns(&self) -> &'a [ColumnSpec] {
        self.columns
    }

    pub fn cell(&self, idx: usize) -> Option<Cell<'a>> {
        self.cells.get(idx).copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

pub trait DeltaModel: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Raw model output for one row.
    fn predict(&self, row: &InferenceRow<'_>) -> Result<f64, PredictError>;
}

pub struct InferenceEngine {
    model: Box<dyn DeltaModel>,
    columns: Vec<ColumnSpec>,
}

impl InferenceEngine {
    pub fn new(model: Box<dyn DeltaModel>, schema: &FeatureSchema) -> Self {
        let columns = schema
            .features
            .iter()
            .map(|f| ColumnSpec {
                name: f.name(),
                kind: f.kind(),
            })
            .collect();
        Self { model, columns }
    }

    pub fn model_kind(&self) -> &'static str {
        self.model.kind()
    }

    pub fn categorical_features(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| c.kind == FeatureKind::Categorical)
            .map(|c| c.name)
            .collect()
    }

    pub fn predict_delta(&self, record: &FeatureRecord) -> Result<f64, PredictError> {
        let row = self.to_row(record)?;
        let out = self.model.predict(&row)?;
        if !out.is_finite() {
            return Err(PredictError::Inference(format!(
                "model returned non-finite output {out}"
            )));
        }
        Ok(out)
    }

    fn to_row<'a>(&'a self, record: &'a FeatureRecord) -> Result<InferenceRow<'a>, PredictError> {
        let mut fields = record.iter();
        let mut cells = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            let (feature, value) = fields.next().ok_or_else(|| {
                PredictError::Inference(format!("missing required field {}", col.name))
            })?;
            if feature.name() != col.name {
                return Err(PredictError::Inference(format!(
                    "field {} found where {} was expected",
                    feature.name(),
                    col.name
                )));
            }
            let cell = match (col.kind, value.as_categorical(), value.as_numeric()) {
                (FeatureKind::Categorical, Some(v), _) => Cell::Cat(v),
                (FeatureKind::Numeric, _, Some(v)) if v.is_finite() => Cell::Num(v),
                (FeatureKind::Numeric, _, Some(v)) => {
                    return Err(PredictError::Inference(format!(
                        "non-finite value {v} for {}",
                        col.name
                    )))
                }
                _ => {
                    return Err(PredictError::Inference(format!(
                        "{} declared {:?} but got {:?}",
                        col.name,
                        col.kind,
                        value.kind()
                    )))
                }
            };
            cells.push(cell);
        }
        if let Some((extra, _)) = fields.next() {
            return Err(PredictError::Inference(format!(
                "unexpected trailing field {extra}"
            )));
        }
        Ok(InferenceRow {
            columns: &self.columns,
            cells,
        })
    }
}

/// Load the artifact for `kind` and check it against `schema`.
#[cfg_attr(not(feature = "torch"), allow(unused_variables))]
pub fn load_model(
    kind: ModelKind,
    model_path: &Path,
    meta_path: Option<&Path>,
    schema: &FeatureSchema,
) -> Result<Box<dyn DeltaModel>> {
    match kind {
        // forest artifacts are self-describing; meta.json only feeds the schema
        ModelKind::Forest => Ok(Box::new(ObliviousForest::load(model_path, schema)?)),
        #[cfg(feature = "torch")]
        ModelKind::Torch => Ok(Box::new(TorchModel::load(model_path, meta_path, schema)?)),
        #[cfg(not(feature = "torch"))]
        ModelKind::Torch => {
            anyhow::bail!("built without the `torch` feature; rebuild with --features torch")
        }
    }
}
