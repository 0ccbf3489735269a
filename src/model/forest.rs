//! Oblivious decision-tree ensemble, evaluated natively.
//!
//! Artifact layout (JSON):
//!
//! ```json
//! {
//!   "bias": 0.0,
//!   "scale": 1.0,
//!   "trees": [
//!     {
//!       "splits": [
//!         {"type": "one_hot", "feature": "CircuitName", "value": "Monza"},
//!         {"type": "border", "feature": "TrackTemp", "border": 38.5}
//!       ],
//!       "leaf_values": [0.0, 0.1, -0.2, -0.3]
//!     }
//!   ]
//! }
//! ```
//!
//! Every tree applies the same split at each depth, so split `i` sets bit
//! `i` of the leaf index. A category the trees never saw matches no
//! `one_hot` split and takes the zero branch.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use super::{Cell, DeltaModel, InferenceRow};
use crate::error::PredictError;
use crate::features::{FeatureKind, FeatureSchema};

const MAX_DEPTH: usize = 16;

#[derive(Debug, Deserialize)]
struct ForestJson {
    #[serde(default)]
    bias: f64,
    #[serde(default = "one")]
    scale: f64,
    trees: Vec<TreeJson>,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct TreeJson {
    splits: Vec<SplitJson>,
    leaf_values: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SplitJson {
    Border { feature: String, border: f64 },
    OneHot { feature: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Split {
    /// Fires when the numeric column is strictly above `border`.
    Border { col: usize, border: f64 },
    /// Fires when the categorical column equals `value`.
    OneHot { col: usize, value: String },
}

#[derive(Debug, Clone, PartialEq)]
struct Tree {
    splits: Vec<Split>,
    leaf_values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObliviousForest {
    bias: f64,
    scale: f64,
    trees: Vec<Tree>,
    n_columns: usize,
}

impl ObliviousForest {
    pub fn load(path: &Path, schema: &FeatureSchema) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read forest model at {}", path.display()))?;
        Self::from_json(&txt, schema)
            .with_context(|| format!("invalid forest model {}", path.display()))
    }

    /// Parse and bind every split to a schema column of the right kind.
    pub fn from_json(txt: &str, schema: &FeatureSchema) -> Result<Self> {
        let raw: ForestJson = serde_json::from_str(txt).context("failed to parse forest json")?;
        if !raw.bias.is_finite() || !raw.scale.is_finite() {
            bail!("bias and scale must be finite");
        }

        let resolve = |name: &str, want: FeatureKind| -> Result<usize> {
            let col = schema
                .features
                .iter()
                .position(|f| f.name() == name)
                .with_context(|| format!("split on '{name}' which is not in the feature schema"))?;
            let kind = schema.features[col].kind();
            if kind != want {
                bail!("split on '{name}' expects {want:?} but the schema declares {kind:?}");
            }
            Ok(col)
        };

        let mut trees = Vec::with_capacity(raw.trees.len());
        for (t, tree) in raw.trees.into_iter().enumerate() {
            let depth = tree.splits.len();
            if depth > MAX_DEPTH {
                bail!("tree {t} has depth {depth}, max is {MAX_DEPTH}");
            }
            if tree.leaf_values.len() != 1 << depth {
                bail!(
                    "tree {t} has {} leaves, expected {} for depth {depth}",
                    tree.leaf_values.len(),
                    1usize << depth
                );
            }
            if tree.leaf_values.iter().any(|v| !v.is_finite()) {
                bail!("tree {t} has a non-finite leaf value");
            }
            let splits = tree
                .splits
                .into_iter()
                .map(|s| match s {
                    SplitJson::Border { feature, border } => Ok(Split::Border {
                        col: resolve(&feature, FeatureKind::Numeric)?,
                        border,
                    }),
                    SplitJson::OneHot { feature, value } => Ok(Split::OneHot {
                        col: resolve(&feature, FeatureKind::Categorical)?,
                        value,
                    }),
                })
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("tree {t}"))?;
            trees.push(Tree {
                splits,
                leaf_values: tree.leaf_values,
            });
        }

        Ok(Self {
            bias: raw.bias,
            scale: raw.scale,
            trees,
            n_columns: schema.features.len(),
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Split {
    fn fires(&self, row: &InferenceRow<'_>) -> Result<bool, PredictError> {
        match self {
            Split::Border { col, border } => match row.cell(*col) {
                Some(Cell::Num(v)) => Ok(v > *border),
                other => Err(mismatch(*col, "numeric", other)),
            },
            Split::OneHot { col, value } => match row.cell(*col) {
                Some(Cell::Cat(v)) => Ok(v == value.as_str()),
                other => Err(mismatch(*col, "categorical", other)),
            },
        }
    }
}

fn mismatch(col: usize, want: &str, got: Option<Cell<'_>>) -> PredictError {
    PredictError::Inference(format!("column {col} should be {want}, got {got:?}"))
}

impl DeltaModel for ObliviousForest {
    fn kind(&self) -> &'static str {
        "forest"
    }

    fn predict(&self, row: &InferenceRow<'_>) -> Result<f64, PredictError> {
        if row.len() != self.n_columns {
            return Err(PredictError::Inference(format!(
                "row has {} columns, model expects {}",
                row.len(),
                self.n_columns
            )));
        }
        let mut sum = 0.0;
        for tree in &self.trees {
            let mut leaf = 0usize;
            for (bit, split) in tree.splits.iter().enumerate() {
                if split.fires(row)? {
                    leaf |= 1 << bit;
                }
            }
            sum += tree.leaf_values[leaf];
        }
        Ok(sum * self.scale + self.bias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Feature, FeatureRecord, FeatureValue, SchemaVersion};
    use crate::model::InferenceEngine;

    const MODEL: &str = r#"{
        "bias": -0.1,
        "trees": [
            {
                "splits": [
                    {"type": "one_hot", "feature": "CircuitName", "value": "Monza"},
                    {"type": "border", "feature": "TrackTemp", "border": 38.5}
                ],
                "leaf_values": [0.0, -0.1, 0.05, -0.15]
            },
            {
                "splits": [{"type": "one_hot", "feature": "Driver", "value": "VER"}],
                "leaf_values": [0.02, -0.2]
            }
        ]
    }"#;

    fn record(
        schema: &FeatureSchema,
        circuit: &str,
        driver: &str,
        track_temp: f64,
    ) -> FeatureRecord {
        let mut r = FeatureRecord::default();
        for &f in &schema.features {
            let v = match f {
                Feature::CircuitName => FeatureValue::Categorical(circuit.into()),
                Feature::Driver => FeatureValue::Categorical(driver.into()),
                Feature::TrackTemp => FeatureValue::Numeric(track_temp),
                f if f.kind() == FeatureKind::Categorical => FeatureValue::Categorical("x".into()),
                _ => FeatureValue::Numeric(0.0),
            };
            r.push(f, v);
        }
        r
    }

    fn engine(schema: &FeatureSchema) -> InferenceEngine {
        let forest = ObliviousForest::from_json(MODEL, schema).unwrap();
        assert_eq!(forest.n_trees(), 2);
        InferenceEngine::new(Box::new(forest), schema)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn walks_every_tree() {
        let schema = FeatureSchema::builtin(SchemaVersion::TrackHistory);
        let e = engine(&schema);
        // monza + hot track -> leaf 3; VER -> leaf 1
        let out = e.predict_delta(&record(&schema, "Monza", "VER", 41.0)).unwrap();
        assert!(close(out, -0.15 - 0.2 - 0.1), "{out}");
        // monza + cool track -> leaf 1; other driver -> leaf 0
        let out = e.predict_delta(&record(&schema, "Monza", "NOR", 30.0)).unwrap();
        assert!(close(out, -0.1 + 0.02 - 0.1), "{out}");
    }

    #[test]
    fn unseen_category_takes_zero_branch() {
        let schema = FeatureSchema::builtin(SchemaVersion::TrackHistory);
        let e = engine(&schema);
        let out = e
            .predict_delta(&record(&schema, "Nowhere Ring", "NewRookie", 20.0))
            .unwrap();
        assert!(close(out, 0.0 + 0.02 - 0.1), "{out}");
    }

    #[test]
    fn split_on_unknown_column_fails_to_load() {
        let mut schema = FeatureSchema::builtin(SchemaVersion::TrackHistory);
        schema.features.retain(|f| *f != Feature::TrackTemp);
        let err = ObliviousForest::from_json(MODEL, &schema).unwrap_err();
        assert!(format!("{err:#}").contains("TrackTemp"));
    }

    #[test]
    fn split_with_wrong_kind_fails_to_load() {
        let schema = FeatureSchema::builtin(SchemaVersion::TrackHistory);
        let bad = r#"{"trees": [{"splits": [{"type": "border", "feature": "Driver", "border": 1.0}],
                      "leaf_values": [0.0, 1.0]}]}"#;
        assert!(ObliviousForest::from_json(bad, &schema).is_err());
    }

    #[test]
    fn leaf_count_must_match_depth() {
        let schema = FeatureSchema::builtin(SchemaVersion::TrackHistory);
        let bad = r#"{"trees": [{
            "splits": [{"type": "border", "feature": "AirTemp", "border": 1.0}],
            "leaf_values": [0.0, 1.0, 2.0]
        }]}"#;
        let err = ObliviousForest::from_json(bad, &schema).unwrap_err();
        assert!(err.to_string().contains("leaves"));
    }

    #[test]
    fn empty_forest_is_bias_only() {
        let schema = FeatureSchema::builtin(SchemaVersion::DeltaFromMedian);
        let forest =
            ObliviousForest::from_json(r#"{"bias": -0.25, "trees": []}"#, &schema).unwrap();
        let e = InferenceEngine::new(Box::new(forest), &schema);
        assert_eq!(e.predict_delta(&record(&schema, "Monza", "VER", 0.0)).unwrap(), -0.25);
    }
}
