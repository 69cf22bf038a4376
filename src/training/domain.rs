//! Domain types for boosted-tree training and model artefacts.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::error::{ChurnError, ChurnResult};
use crate::data::domain::Dataset;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Objective {
    #[default]
    #[serde(rename = "binary:logistic")]
    BinaryLogistic,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMetric {
    #[default]
    Auc,
}

/// Booster hyperparameters. Names follow the usual boosted-tree vocabulary;
/// `eta` and `num_round` are accepted as aliases in config files.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub objective: Objective,
    pub eval_metric: EvalMetric,
    pub max_depth: usize,
    #[serde(alias = "eta")]
    pub learning_rate: f64,
    #[serde(alias = "num_round")]
    pub rounds: usize,
    /// L2 regularisation on leaf weights.
    pub lambda: f64,
    /// Minimum loss reduction required to split.
    pub gamma: f64,
    pub min_child_weight: f64,
    pub base_score: f64,
    pub subsample: f64,
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            objective: Objective::BinaryLogistic,
            eval_metric: EvalMetric::Auc,
            max_depth: 5,
            learning_rate: 0.2,
            rounds: 100,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            base_score: 0.5,
            subsample: 1.0,
            max_bins: 256,
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> ChurnResult<()> {
        let bad = |msg: String| Err(ChurnError::config(msg));
        if self.rounds == 0 {
            return bad("train.rounds must be positive".into());
        }
        if !(1..=16).contains(&self.max_depth) {
            return bad(format!("train.max_depth must be in 1..=16, got {}", self.max_depth));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return bad(format!(
                "train.learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }
        for (key, value) in [
            ("train.lambda", self.lambda),
            ("train.gamma", self.gamma),
            ("train.min_child_weight", self.min_child_weight),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return bad(format!("{key} must be non-negative, got {value}"));
            }
        }
        if !(self.base_score > 0.0 && self.base_score < 1.0) {
            return bad(format!("train.base_score must be in (0, 1), got {}", self.base_score));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return bad(format!("train.subsample must be in (0, 1], got {}", self.subsample));
        }
        if !(2..=u16::MAX as usize).contains(&self.max_bins) {
            return bad(format!("train.max_bins must be in 2..=65535, got {}", self.max_bins));
        }
        Ok(())
    }
}

/// One node of a regression tree over the logistic margin.
///
/// Nodes are stored in pre-order, so children always sit after their parent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    Split {
        feature: usize,
        /// Rows with `x < threshold` go left.
        threshold: f64,
        left: usize,
        right: usize,
        gain: f64,
        cover: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Leaf value reached by `row`.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature] < *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { value, .. } => {
                    if !value.is_finite() {
                        return Err(format!("node {idx} has a non-finite leaf value"));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {idx} splits on feature {feature} but the model has {n_features}"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {idx} has a non-finite threshold"));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {idx} has invalid child {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Trained boosted-tree ensemble. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoostedModel {
    pub objective: Objective,
    pub base_score: f64,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub label: String,
    pub feature_names: Vec<String>,
    pub trees: Vec<Tree>,
}

pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

impl BoostedModel {
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Check structural invariants; failures are artefact corruption.
    pub fn validate(&self) -> ChurnResult<()> {
        if self.feature_names.is_empty() {
            return Err(ChurnError::model_load("model has no features"));
        }
        if !(self.base_score > 0.0 && self.base_score < 1.0) {
            return Err(ChurnError::model_load(format!(
                "base_score {} outside (0, 1)",
                self.base_score
            )));
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features())
                .map_err(|msg| ChurnError::model_load(format!("tree {idx}: {msg}")))?;
        }
        Ok(())
    }

    /// Raw logistic margin for a row laid out in `feature_names` order.
    pub fn predict_margin(&self, row: &[f64]) -> f64 {
        logit(self.base_score) + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.predict_margin(row))
    }

    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_proba(row)).collect()
    }
}

/// AUC after one boosting round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundEval {
    pub round: usize,
    pub train_auc: Option<f64>,
    pub eval_auc: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrainSummary {
    pub rounds: usize,
    pub train_rows: usize,
    pub eval_rows: usize,
    pub history: Vec<RoundEval>,
}

impl TrainSummary {
    pub fn final_eval_auc(&self) -> Option<f64> {
        self.history.last().and_then(|r| r.eval_auc)
    }

    pub fn final_train_auc(&self) -> Option<f64> {
        self.history.last().and_then(|r| r.train_auc)
    }
}

#[derive(Clone, Debug)]
pub struct TrainedModel {
    pub model: BoostedModel,
    pub summary: TrainSummary,
}

/// How the caller tells the loader where the model lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// Exact path of the model file.
    File(PathBuf),
    /// Directory to scan with the locator's search order.
    Directory(PathBuf),
    /// Zip bundle, extracted into `extract_to` before scanning.
    Bundle { archive: PathBuf, extract_to: PathBuf },
}

/// Paths written when a model is stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredModel {
    pub artifact: PathBuf,
    pub bundle: PathBuf,
}

/// Repository contract for model artefacts.
pub trait ModelRepo {
    fn put_model(&self, name: &str, model: &BoostedModel) -> ChurnResult<StoredModel>;
    fn get_model(&self, location: &ArtifactLocation) -> ChurnResult<BoostedModel>;
}

/// Interface for components that can perform training.
pub trait Trainer {
    fn train(&self, train: &Dataset, eval: Option<&Dataset>) -> ChurnResult<TrainedModel>;
}
