//! Feature importance from the ensemble and the SHAP analysis config.

use std::fs;
use std::path::{Path, PathBuf};

use crate::common::error::{ChurnError, ChurnResult};
use crate::common::time;
use crate::training::domain::{BoostedModel, TreeNode};

use super::domain::{
    AnalysisConfig, ExplainCfg, ExplainOutput, FeatureImportance, ImportanceKind, Methods,
    ShapMethod,
};

pub const IMPORTANCE_FILE: &str = "feature_importance.json";

#[derive(Clone, Copy, Default)]
struct SplitStats {
    count: usize,
    gain: f64,
    cover: f64,
}

/// Importance of every feature that appears in at least one split.
///
/// Sorted by descending score; ties keep model column order.
pub fn feature_importance(model: &BoostedModel, kind: ImportanceKind) -> Vec<FeatureImportance> {
    let mut stats = vec![SplitStats::default(); model.n_features()];
    for tree in &model.trees {
        for node in &tree.nodes {
            if let TreeNode::Split {
                feature, gain, cover, ..
            } = node
            {
                if let Some(s) = stats.get_mut(*feature) {
                    s.count += 1;
                    s.gain += gain;
                    s.cover += cover;
                }
            }
        }
    }

    let mut ranked: Vec<FeatureImportance> = model
        .feature_names
        .iter()
        .zip(&stats)
        .filter(|(_, s)| s.count > 0)
        .map(|(name, s)| {
            let n = s.count as f64;
            let score = match kind {
                ImportanceKind::Gain => s.gain / n,
                ImportanceKind::TotalGain => s.gain,
                ImportanceKind::Cover => s.cover / n,
                ImportanceKind::Weight => n,
            };
            FeatureImportance {
                feature: name.clone(),
                score,
            }
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Build the analysis config with an all-zero baseline row.
pub fn analysis_config(model: &BoostedModel, cfg: &ExplainCfg) -> AnalysisConfig {
    let mut headers = Vec::with_capacity(model.n_features() + 1);
    headers.push(model.label.clone());
    headers.extend(model.feature_names.iter().cloned());
    AnalysisConfig {
        dataset_type: "text/csv".to_string(),
        headers,
        label: model.label.clone(),
        methods: Methods {
            shap: ShapMethod {
                num_samples: cfg.num_samples,
                agg_method: cfg.agg_method.clone(),
                baseline: vec![vec![0.0; model.n_features()]],
            },
        },
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> ChurnResult<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|err| ChurnError::config(format!("serialise {}: {err}", path.display())))?;
    fs::write(path, json).map_err(|source| ChurnError::io(path, source))
}

/// Write `<model_name>_analysis_config.json` into `dir`.
pub fn write_analysis_config(
    dir: &Path,
    model_name: &str,
    config: &AnalysisConfig,
) -> ChurnResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|source| ChurnError::io(dir, source))?;
    let path = dir.join(format!("{model_name}_analysis_config.json"));
    write_json(&path, config)?;
    Ok(path)
}

/// Produce the importance ranking and the analysis config under `dir`.
pub fn explain(
    model: &BoostedModel,
    cfg: &ExplainCfg,
    dir: &Path,
    model_name: &str,
) -> ChurnResult<ExplainOutput> {
    time::timed("explain", || {
        let importance = feature_importance(model, cfg.importance);
        let analysis_config = write_analysis_config(dir, model_name, &analysis_config(model, cfg))?;
        let importance_file = dir.join(IMPORTANCE_FILE);
        write_json(&importance_file, &importance)?;
        if let Some(top) = importance.first() {
            tracing::info!(
                kind = cfg.importance.as_str(),
                feature = %top.feature,
                score = top.score,
                used = importance.len(),
                "top feature"
            );
        }
        Ok(ExplainOutput {
            analysis_config,
            importance_file,
            importance,
        })
    })
}
