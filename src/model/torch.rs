use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::{fs, path::Path};
use tch::{kind::Kind, CModule, Device, Tensor};

use super::{Cell, DeltaModel, InferenceRow};
use crate::error::PredictError;
use crate::features::{FeatureKind, FeatureSchema};

#[derive(Deserialize)]
struct VocabJson {
    /// Training vocabulary per categorical column; index = position.
    #[serde(default)]
    cat_vocab: HashMap<String, Vec<String>>,
}

/// TorchScript regressor over a flat float vector. Categoricals are
/// encoded through the training vocabulary; anything outside it maps to
/// the reserved out-of-vocabulary slot `vocab.len()`.
pub struct TorchModel {
    model: CModule,
    device: Device,
    vocab: Vec<Option<HashMap<String, usize>>>,
    in_dim: usize,
}

impl TorchModel {
    pub fn load(
        model_path: &Path,
        meta_path: Option<&Path>,
        schema: &FeatureSchema,
    ) -> Result<Self> {
        let device = Device::Cpu;

        let meta_path = meta_path.context("the torch backend needs META_PATH for cat_vocab")?;
        let meta_txt = fs::read_to_string(meta_path)
            .with_context(|| format!("failed to read meta at {}", meta_path.display()))?;
        let mut meta: VocabJson =
            serde_json::from_str(&meta_txt).with_context(|| "failed to parse meta.json")?;

        let mut vocab = Vec::with_capacity(schema.features.len());
        for f in &schema.features {
            match f.kind() {
                FeatureKind::Numeric => vocab.push(None),
                FeatureKind::Categorical => {
                    let values = meta
                        .cat_vocab
                        .remove(f.name())
                        .with_context(|| format!("cat_vocab has no entry for {}", f.name()))?;
                    let index = values
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (v, i))
                        .collect::<HashMap<_, _>>();
                    vocab.push(Some(index));
                }
            }
        }
        let in_dim = schema.features.len();

        let model = CModule::load_on_device(model_path, device)
            .with_context(|| format!("failed to load TorchScript {}", model_path.display()))?;

        // Probe output shape with a dummy forward; expect a single scalar
        let dummy = Tensor::zeros([1, in_dim as i64], (Kind::Float, device));
        let t = model.forward_ts(&[dummy])?;
        if t.numel() != 1 {
            bail!("unexpected model output size: {:?}", t.size());
        }

        tracing::info!("loaded TorchScript model; in_dim={}", in_dim);
        Ok(Self {
            model,
            device,
            vocab,
            in_dim,
        })
    }

    fn encode(&self, row: &InferenceRow<'_>) -> Result<Vec<f32>, PredictError> {
        if row.len() != self.in_dim {
            return Err(PredictError::Inference(format!(
                "feature length mismatch: got {}, expected {}",
                row.len(),
                self.in_dim
            )));
        }
        let mut x = Vec::with_capacity(self.in_dim);
        for (i, vocab) in self.vocab.iter().enumerate() {
            let v = match (row.cell(i), vocab) {
                (Some(Cell::Num(v)), None) => v as f32,
                (Some(Cell::Cat(v)), Some(index)) => {
                    index.get(v).copied().unwrap_or(index.len()) as f32
                }
                (cell, _) => {
                    let name = row.columns().get(i).map(|c| c.name).unwrap_or("?");
                    return Err(PredictError::Inference(format!(
                        "cannot encode {name}: {cell:?}"
                    )));
                }
            };
            x.push(v);
        }
        Ok(x)
    }
}

impl DeltaModel for TorchModel {
    fn kind(&self) -> &'static str {
        "torch"
    }

    fn predict(&self, row: &InferenceRow<'_>) -> Result<f64, PredictError> {
        let x = self.encode(row)?;
        let input = Tensor::from_slice(&x)
            .reshape([1, self.in_dim as i64])
            .to_device(self.device);

        let t = self
            .model
            .forward_ts(&[input])
            .map_err(|e| PredictError::Inference(e.to_string()))?;
        Ok(t.reshape([-1]).double_value(&[0]))
    }
}
