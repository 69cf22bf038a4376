//! Second-order gradient boosting of depth-limited regression trees for the
//! binary logistic objective.
//!
//! Split search runs over per-feature histograms: each feature is cut into at
//! most `max_bins` intervals once, up front, and every node accumulates
//! gradient/hessian sums per interval.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::error::{ChurnError, ChurnResult};
use crate::data::domain::Dataset;
use crate::evaluation::metrics::roc_auc;

use super::domain::{
    logit, sigmoid, BoostedModel, RoundEval, TrainConfig, TrainSummary, TrainedModel, Trainer,
    Tree, TreeNode,
};

const MIN_HESSIAN: f64 = 1e-16;

/// Boosted-tree trainer configured once and reusable across datasets.
#[derive(Clone, Debug, Default)]
pub struct GbdtTrainer {
    cfg: TrainConfig,
}

impl GbdtTrainer {
    pub fn new(cfg: TrainConfig) -> ChurnResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.cfg
    }
}

/// Per-feature cut points and the bin index of every row (column-major).
struct BinnedMatrix {
    cuts: Vec<Vec<f64>>,
    bins: Vec<Vec<u16>>,
}

impl BinnedMatrix {
    fn build(rows: &[Vec<f64>], n_features: usize, max_bins: usize) -> Self {
        let mut cuts = Vec::with_capacity(n_features);
        let mut bins = Vec::with_capacity(n_features);
        for j in 0..n_features {
            let feature_cuts = cut_points(rows.iter().map(|r| r[j]), max_bins);
            let column = rows
                .iter()
                .map(|r| feature_cuts.partition_point(|&c| c <= r[j]) as u16)
                .collect();
            cuts.push(feature_cuts);
            bins.push(column);
        }
        Self { cuts, bins }
    }
}

/// Candidate thresholds for one feature; `x < cuts[k]` is bin `<= k`.
fn cut_points(values: impl Iterator<Item = f64>, max_bins: usize) -> Vec<f64> {
    let mut distinct: Vec<f64> = values.collect();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    if distinct.len() < 2 {
        return Vec::new();
    }
    if distinct.len() <= max_bins {
        return distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    }
    let mut cuts: Vec<f64> = (1..max_bins)
        .map(|k| distinct[k * distinct.len() / max_bins])
        .collect();
    cuts.dedup();
    cuts
}

#[derive(Clone, Copy, Debug)]
struct SplitCandidate {
    feature: usize,
    cut: usize,
    gain: f64,
}

struct TreeGrower<'a> {
    cfg: &'a TrainConfig,
    matrix: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
}

impl TreeGrower<'_> {
    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.cfg.lambda)
    }

    fn grow(&self, rows: Vec<usize>) -> Tree {
        let mut nodes = Vec::new();
        self.grow_node(rows, 0, &mut nodes);
        Tree { nodes }
    }

    fn grow_node(&self, rows: Vec<usize>, depth: usize, nodes: &mut Vec<TreeNode>) -> usize {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();
        let idx = nodes.len();
        nodes.push(TreeNode::Leaf {
            value: -self.cfg.learning_rate * g / (h + self.cfg.lambda),
            cover: h,
        });

        if depth >= self.cfg.max_depth || rows.len() < 2 {
            return idx;
        }
        let Some(best) = self.best_split(&rows, g, h) else {
            return idx;
        };

        let column = &self.matrix.bins[best.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&i| column[i] as usize <= best.cut);
        let left = self.grow_node(left_rows, depth + 1, nodes);
        let right = self.grow_node(right_rows, depth + 1, nodes);
        nodes[idx] = TreeNode::Split {
            feature: best.feature,
            threshold: self.matrix.cuts[best.feature][best.cut],
            left,
            right,
            gain: best.gain,
            cover: h,
        };
        idx
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = self.score(g, h);
        let mut best: Option<SplitCandidate> = None;

        for (feature, cuts) in self.matrix.cuts.iter().enumerate() {
            if cuts.is_empty() {
                continue;
            }
            let n_bins = cuts.len() + 1;
            let mut g_hist = vec![0.0f64; n_bins];
            let mut h_hist = vec![0.0f64; n_bins];
            let mut counts = vec![0usize; n_bins];
            let column = &self.matrix.bins[feature];
            for &i in rows {
                let b = column[i] as usize;
                g_hist[b] += self.grad[i];
                h_hist[b] += self.hess[i];
                counts[b] += 1;
            }

            let (mut gl, mut hl, mut nl) = (0.0f64, 0.0f64, 0usize);
            for cut in 0..cuts.len() {
                gl += g_hist[cut];
                hl += h_hist[cut];
                nl += counts[cut];
                let nr = rows.len() - nl;
                let (gr, hr) = (g - gl, h - hl);
                if nl == 0 || nr == 0 {
                    continue;
                }
                if hl < self.cfg.min_child_weight || hr < self.cfg.min_child_weight {
                    continue;
                }
                let gain =
                    0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.cfg.gamma;
                if gain > best.map_or(0.0, |b| b.gain) {
                    best = Some(SplitCandidate { feature, cut, gain });
                }
            }
        }
        best
    }
}

fn check_finite(dataset: &Dataset) -> ChurnResult<()> {
    let names = dataset.schema().names();
    for (row_idx, row) in dataset.rows().iter().enumerate() {
        if let Some(col) = row.iter().position(|v| !v.is_finite()) {
            return Err(ChurnError::training(format!(
                "row {row_idx}, column {:?} is not a finite number",
                names[col]
            )));
        }
    }
    Ok(())
}

fn auc_or_none(labels: &[u8], margins: &[f64]) -> Option<f64> {
    // AUC is rank based, so margins rank the same as probabilities.
    roc_auc(labels, margins).ok()
}

impl Trainer for GbdtTrainer {
    fn train(&self, train: &Dataset, eval: Option<&Dataset>) -> ChurnResult<TrainedModel> {
        let cfg = &self.cfg;
        if train.is_empty() {
            return Err(ChurnError::training("training dataset is empty"));
        }
        check_finite(train)?;

        let feature_names = train.schema().names();
        let eval_rows = match eval {
            Some(eval) => {
                check_finite(eval)?;
                let rows = eval.table().aligned_rows(&feature_names).map_err(|m| {
                    ChurnError::training(format!("evaluation set does not match: {m}"))
                })?;
                Some((rows, eval.labels()))
            }
            None => None,
        };

        let n = train.len();
        let labels: Vec<f64> = train.labels().iter().map(|&y| y as f64).collect();
        let matrix = BinnedMatrix::build(train.rows(), feature_names.len(), cfg.max_bins);
        let base_margin = logit(cfg.base_score);
        let mut margin = vec![base_margin; n];
        let mut eval_margin = eval_rows
            .as_ref()
            .map(|(rows, _)| vec![base_margin; rows.len()]);
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut grad = vec![0.0f64; n];
        let mut hess = vec![0.0f64; n];
        let mut trees = Vec::with_capacity(cfg.rounds);
        let mut history = Vec::with_capacity(cfg.rounds);

        for round in 0..cfg.rounds {
            for i in 0..n {
                let p = sigmoid(margin[i]);
                grad[i] = p - labels[i];
                hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let mut sample: Vec<usize> = if cfg.subsample < 1.0 {
                (0..n).filter(|_| rng.random::<f64>() < cfg.subsample).collect()
            } else {
                (0..n).collect()
            };
            if sample.is_empty() {
                sample = (0..n).collect();
            }

            let tree = TreeGrower {
                cfg,
                matrix: &matrix,
                grad: &grad,
                hess: &hess,
            }
            .grow(sample);

            for (m, row) in margin.iter_mut().zip(train.rows()) {
                *m += tree.predict(row);
            }
            let mut eval_auc = None;
            if let (Some(em), Some((rows, eval_labels))) = (eval_margin.as_mut(), &eval_rows) {
                for (m, row) in em.iter_mut().zip(rows) {
                    *m += tree.predict(row);
                }
                eval_auc = auc_or_none(eval_labels, em.as_slice());
            }
            let train_auc = auc_or_none(train.labels(), &margin);
            tracing::debug!(
                round,
                nodes = tree.nodes.len(),
                train_auc = train_auc.unwrap_or(f64::NAN),
                eval_auc = eval_auc.unwrap_or(f64::NAN),
                "boosting round"
            );
            history.push(RoundEval {
                round,
                train_auc,
                eval_auc,
            });
            trees.push(tree);
        }

        let summary = TrainSummary {
            rounds: cfg.rounds,
            train_rows: n,
            eval_rows: eval_rows.as_ref().map_or(0, |(rows, _)| rows.len()),
            history,
        };
        tracing::info!(
            rounds = summary.rounds,
            train_rows = summary.train_rows,
            eval_rows = summary.eval_rows,
            train_auc = summary.final_train_auc().unwrap_or(f64::NAN),
            eval_auc = summary.final_eval_auc().unwrap_or(f64::NAN),
            "training finished"
        );

        Ok(TrainedModel {
            model: BoostedModel {
                objective: cfg.objective,
                base_score: cfg.base_score,
                learning_rate: cfg.learning_rate,
                max_depth: cfg.max_depth,
                label: train.label_name().to_string(),
                feature_names,
                trees,
            },
            summary,
        })
    }
}
