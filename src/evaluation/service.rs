//! Scoring a labeled subset and gating on the resulting report.

use crate::common::error::{ChurnError, ChurnResult};
use crate::common::time;
use crate::data::domain::{Dataset, FeatureTable};
use crate::training::artifact;
use crate::training::domain::BoostedModel;

use super::domain::{GateCfg, GateDecision, MetricsReport};
use super::metrics::{self, ConfusionMatrix, DECISION_THRESHOLD};

/// Positive-class probabilities for every row, columns aligned by name.
pub fn predict(model: &BoostedModel, table: &FeatureTable) -> ChurnResult<Vec<f64>> {
    let rows = table.aligned_rows(&model.feature_names).map_err(|mismatch| {
        ChurnError::evaluation(format!("features do not match the model: {mismatch}"))
    })?;
    Ok(model.predict_rows(&rows))
}

/// Metrics of `model` on a labeled dataset.
pub fn evaluate(model: &BoostedModel, dataset: &Dataset) -> ChurnResult<MetricsReport> {
    if dataset.is_empty() {
        return Err(ChurnError::evaluation("evaluation dataset is empty"));
    }
    let scores = predict(model, dataset.table())?;
    let predicted = metrics::threshold(&scores, DECISION_THRESHOLD);
    let cm = ConfusionMatrix::from_labels(dataset.labels(), &predicted);
    let auc = metrics::roc_auc(dataset.labels(), &scores)?;
    let report = MetricsReport::new(cm.accuracy(), cm.precision(), cm.recall(), auc);
    tracing::info!(
        rows = dataset.len(),
        tp = cm.tp,
        fp = cm.fp,
        tn = cm.tn,
        fn_ = cm.fn_,
        accuracy = report.classification_metrics.accuracy,
        precision = report.classification_metrics.precision,
        recall = report.classification_metrics.recall,
        auc,
        "evaluation finished"
    );
    Ok(report)
}

/// Decode artefact bytes and evaluate them on `dataset`.
pub fn score(artifact_bytes: &[u8], dataset: &Dataset) -> ChurnResult<MetricsReport> {
    time::timed("evaluate", || {
        let model = artifact::decode(artifact_bytes)?;
        evaluate(&model, dataset)
    })
}

/// Strict comparison `report[metric] > threshold`.
pub fn gate(report: &MetricsReport, cfg: &GateCfg) -> ChurnResult<GateDecision> {
    let value = report.lookup(&cfg.metric)?;
    let decision = GateDecision {
        passed: value > cfg.threshold,
        metric: cfg.metric.clone(),
        value,
        threshold: cfg.threshold,
    };
    tracing::info!(
        metric = %decision.metric,
        value,
        threshold = cfg.threshold,
        passed = decision.passed,
        "gate evaluated"
    );
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::Schema;
    use crate::training::domain::{Objective, Tree, TreeNode};

    /// One stump on `x`: margin -2 below 0.5, +2 at or above.
    fn stump_model() -> BoostedModel {
        BoostedModel {
            objective: Objective::BinaryLogistic,
            base_score: 0.5,
            learning_rate: 1.0,
            max_depth: 1,
            label: "label".into(),
            feature_names: vec!["x".into(), "y".into()],
            trees: vec![Tree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 0,
                        threshold: 0.5,
                        left: 1,
                        right: 2,
                        gain: 1.0,
                        cover: 4.0,
                    },
                    TreeNode::Leaf {
                        value: -2.0,
                        cover: 2.0,
                    },
                    TreeNode::Leaf {
                        value: 2.0,
                        cover: 2.0,
                    },
                ],
            }],
        }
    }

    fn dataset(names: &[&str], rows: Vec<Vec<f64>>, labels: Vec<u8>) -> Dataset {
        let table = FeatureTable::new(Schema::numeric(names.iter().copied()).unwrap(), rows).unwrap();
        Dataset::new(table, "label", labels).unwrap()
    }

    #[test]
    fn perfect_separation_scores_one() {
        let data = dataset(
            &["x", "y"],
            vec![vec![0.0, 1.0], vec![0.2, 0.0], vec![0.9, 1.0], vec![1.0, 0.0]],
            vec![0, 0, 1, 1],
        );
        let report = evaluate(&stump_model(), &data).unwrap();
        assert_eq!(report, MetricsReport::new(1.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn reordered_columns_are_aligned() {
        let data = dataset(
            &["y", "x"],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![0, 1],
        );
        assert_eq!(evaluate(&stump_model(), &data).unwrap().auc(), 1.0);
    }

    #[test]
    fn missing_column_is_evaluation_error() {
        let data = dataset(&["x"], vec![vec![0.0], vec![1.0]], vec![0, 1]);
        let err = evaluate(&stump_model(), &data).unwrap_err();
        assert!(matches!(err, ChurnError::Evaluation(msg) if msg.contains("y")));
    }

    #[test]
    fn extra_column_is_evaluation_error() {
        let data = dataset(
            &["x", "y", "z"],
            vec![vec![0.0, 0.0, 0.0], vec![1.0, 0.0, 0.0]],
            vec![0, 1],
        );
        assert!(matches!(
            evaluate(&stump_model(), &data),
            Err(ChurnError::Evaluation(_))
        ));
    }

    #[test]
    fn score_rejects_garbage_artefact() {
        let data = dataset(&["x", "y"], vec![vec![0.0, 0.0], vec![1.0, 0.0]], vec![0, 1]);
        assert!(matches!(score(b"nope", &data), Err(ChurnError::ModelLoad(_))));
    }

    #[test]
    fn score_decodes_and_evaluates() {
        let data = dataset(&["x", "y"], vec![vec![0.0, 0.0], vec![1.0, 0.0]], vec![0, 1]);
        let bytes = artifact::encode(&stump_model()).unwrap();
        assert_eq!(score(&bytes, &data).unwrap().auc(), 1.0);
    }

    #[test]
    fn gate_is_strict_and_monotone() {
        let report = MetricsReport::new(0.5, 0.5, 0.5, 0.8);
        let at = |threshold| {
            gate(
                &report,
                &GateCfg {
                    threshold,
                    ..GateCfg::default()
                },
            )
            .unwrap()
            .passed
        };
        assert!(!at(0.8));
        assert!(at(0.79));
        assert!(!at(0.81));
        assert!(at(0.0));
    }

    #[test]
    fn gate_on_unknown_metric_is_config_error() {
        let report = MetricsReport::new(0.5, 0.5, 0.5, 0.8);
        let cfg = GateCfg {
            metric: "classification_metrics.f1".into(),
            threshold: 0.1,
        };
        assert!(matches!(gate(&report, &cfg), Err(ChurnError::Config(_))));
    }
}
