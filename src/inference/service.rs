//! Batch transform: score a feature table and write one probability per line.

use std::fs;
use std::path::Path;

use crate::common::error::{ChurnError, ChurnResult};
use crate::common::time;
use crate::data::domain::FeatureTable;
use crate::evaluation::metrics::DECISION_THRESHOLD;
use crate::evaluation::service as evaluation;
use crate::training::domain::BoostedModel;

use super::domain::TransformOutput;

/// Write probabilities as a header-less single-column CSV.
pub fn write_predictions(path: &Path, scores: &[f64]) -> ChurnResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ChurnError::io(parent, source))?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|err| ChurnError::input(format!("{}: {err}", path.display())))?;
    for score in scores {
        writer
            .write_record([score.to_string()])
            .map_err(|err| ChurnError::input(format!("{}: {err}", path.display())))?;
    }
    writer.flush().map_err(|source| ChurnError::io(path, source))
}

/// Read back a predictions file written by [`write_predictions`].
pub fn read_predictions(path: &Path) -> ChurnResult<Vec<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|err| ChurnError::input(format!("{}: {err}", path.display())))?;
    reader
        .records()
        .enumerate()
        .map(|(idx, record)| {
            let record =
                record.map_err(|err| ChurnError::input(format!("line {}: {err}", idx + 1)))?;
            record
                .get(0)
                .and_then(|raw| raw.parse::<f64>().ok())
                .ok_or_else(|| ChurnError::input(format!("line {} is not a probability", idx + 1)))
        })
        .collect()
}

/// Score every row of `table` with `model` and write the result to `out`.
pub fn transform(model: &BoostedModel, table: &FeatureTable, out: &Path) -> ChurnResult<TransformOutput> {
    time::timed("transform", || {
        let scores = evaluation::predict(model, table)?;
        write_predictions(out, &scores)?;
        let positives = scores.iter().filter(|&&p| p >= DECISION_THRESHOLD).count();
        let output = TransformOutput {
            path: out.to_path_buf(),
            rows: scores.len(),
            positive_share: if scores.is_empty() {
                0.0
            } else {
                positives as f64 / scores.len() as f64
            },
        };
        tracing::info!(
            path = %output.path.display(),
            rows = output.rows,
            positive_share = output.positive_share,
            "batch transform written"
        );
        Ok(output)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::Schema;
    use crate::training::domain::{Objective, Tree, TreeNode};
    use tempfile::tempdir;

    fn model() -> BoostedModel {
        BoostedModel {
            objective: Objective::BinaryLogistic,
            base_score: 0.5,
            learning_rate: 1.0,
            max_depth: 1,
            label: "label".into(),
            feature_names: vec!["age".into()],
            trees: vec![Tree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 0,
                        threshold: 40.0,
                        left: 1,
                        right: 2,
                        gain: 1.0,
                        cover: 2.0,
                    },
                    TreeNode::Leaf {
                        value: -1.0,
                        cover: 1.0,
                    },
                    TreeNode::Leaf {
                        value: 1.0,
                        cover: 1.0,
                    },
                ],
            }],
        }
    }

    #[test]
    fn writes_one_probability_per_row() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("transform").join("predictions.csv");
        let table =
            FeatureTable::new(Schema::numeric(["age"]).unwrap(), vec![vec![30.0], vec![50.0]])
                .unwrap();
        let output = transform(&model(), &table, &out).unwrap();
        assert_eq!(output.rows, 2);
        assert_eq!(output.positive_share, 0.5);

        let scores = read_predictions(&out).unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0] < 0.5 && scores[1] > 0.5);
        assert_eq!(fs::read_to_string(&out).unwrap().lines().count(), 2);
    }

    #[test]
    fn mismatched_table_is_evaluation_error() {
        let dir = tempdir().unwrap();
        let table =
            FeatureTable::new(Schema::numeric(["income"]).unwrap(), vec![vec![1.0]]).unwrap();
        let err = transform(&model(), &table, &dir.path().join("p.csv")).unwrap_err();
        assert!(matches!(err, ChurnError::Evaluation(_)));
    }
}
