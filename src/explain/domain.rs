//! Explainability settings and the documents handed to the SHAP service.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::error::{ChurnError, ChurnResult};

/// How per-feature importance is aggregated over the ensemble.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceKind {
    /// Mean split gain.
    #[default]
    Gain,
    TotalGain,
    /// Mean hessian cover of the splitting nodes.
    Cover,
    /// Number of splits.
    Weight,
}

impl ImportanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportanceKind::Gain => "gain",
            ImportanceKind::TotalGain => "total_gain",
            ImportanceKind::Cover => "cover",
            ImportanceKind::Weight => "weight",
        }
    }
}

impl FromStr for ImportanceKind {
    type Err = ChurnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gain" => Ok(ImportanceKind::Gain),
            "total_gain" => Ok(ImportanceKind::TotalGain),
            "cover" => Ok(ImportanceKind::Cover),
            "weight" => Ok(ImportanceKind::Weight),
            other => Err(ChurnError::config(format!(
                "unknown importance kind {other:?}, expected gain, total_gain, cover or weight"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainCfg {
    pub num_samples: usize,
    pub agg_method: String,
    pub importance: ImportanceKind,
}

impl Default for ExplainCfg {
    fn default() -> Self {
        Self {
            num_samples: 100,
            agg_method: "mean_abs".to_string(),
            importance: ImportanceKind::Gain,
        }
    }
}

/// Aggregations the SHAP service accepts.
const AGG_METHODS: [&str; 3] = ["mean_abs", "median", "mean_sq"];

impl ExplainCfg {
    pub fn validate(&self) -> ChurnResult<()> {
        if self.num_samples == 0 {
            return Err(ChurnError::config("explain.num_samples must be positive"));
        }
        if !AGG_METHODS.contains(&self.agg_method.as_str()) {
            return Err(ChurnError::config(format!(
                "explain.agg_method {:?} is not one of {AGG_METHODS:?}",
                self.agg_method
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapMethod {
    pub num_samples: usize,
    pub agg_method: String,
    pub baseline: Vec<Vec<f64>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Methods {
    pub shap: ShapMethod,
}

/// Analysis configuration consumed by the external SHAP job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub dataset_type: String,
    /// Label first, then the features in model order.
    pub headers: Vec<String>,
    pub label: String,
    pub methods: Methods,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExplainOutput {
    pub analysis_config: PathBuf,
    pub importance_file: PathBuf,
    pub importance: Vec<FeatureImportance>,
}
