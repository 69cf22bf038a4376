//! Evaluation report, gate configuration and the report repository contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::error::{ChurnError, ChurnResult};

/// Dotted path of the default gate metric.
pub const AUC_PATH: &str = "classification_metrics.auc_score.value";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AucScore {
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub auc_score: AucScore,
}

/// Metrics for one model on one labeled subset.
///
/// Serialized as `evaluation.json`; the nesting is what gate paths address.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub classification_metrics: ClassificationMetrics,
}

impl MetricsReport {
    pub fn new(accuracy: f64, precision: f64, recall: f64, auc: f64) -> Self {
        Self {
            classification_metrics: ClassificationMetrics {
                accuracy,
                precision,
                recall,
                auc_score: AucScore { value: auc },
            },
        }
    }

    pub fn auc(&self) -> f64 {
        self.classification_metrics.auc_score.value
    }

    /// Resolve a dotted path (or a short alias) to a number.
    pub fn lookup(&self, metric: &str) -> ChurnResult<f64> {
        let path = resolve_alias(metric);
        let tree = serde_json::to_value(self)
            .map_err(|err| ChurnError::evaluation(format!("serialise report: {err}")))?;
        let mut node = &tree;
        for key in path.split('.') {
            node = node.get(key).ok_or_else(|| {
                ChurnError::config(format!("metric {metric:?} is not in the report"))
            })?;
        }
        match node {
            Value::Number(n) => n.as_f64().ok_or_else(|| {
                ChurnError::config(format!("metric {metric:?} is not representable as f64"))
            }),
            _ => Err(ChurnError::config(format!(
                "metric {metric:?} does not resolve to a number"
            ))),
        }
    }
}

fn resolve_alias(metric: &str) -> &str {
    match metric {
        "auc" => AUC_PATH,
        "accuracy" => "classification_metrics.accuracy",
        "precision" => "classification_metrics.precision",
        "recall" => "classification_metrics.recall",
        other => other,
    }
}

/// Gate configuration: `report[metric] > threshold`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateCfg {
    pub metric: String,
    pub threshold: f64,
}

impl Default for GateCfg {
    fn default() -> Self {
        Self {
            metric: AUC_PATH.to_string(),
            threshold: 0.8,
        }
    }
}

impl GateCfg {
    pub fn validate(&self) -> ChurnResult<()> {
        if self.metric.trim().is_empty() {
            return Err(ChurnError::config("gate.metric must not be empty"));
        }
        if !self.threshold.is_finite() {
            return Err(ChurnError::config(format!(
                "gate.threshold must be finite, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub passed: bool,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
}

/// Repository contract for evaluation reports.
pub trait EvalRepo {
    fn put_report(&self, report: &MetricsReport) -> ChurnResult<std::path::PathBuf>;
    fn get_report(&self) -> ChurnResult<MetricsReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> MetricsReport {
        MetricsReport::new(0.9, 0.7, 0.6, 0.85)
    }

    #[test]
    fn serialises_with_nested_auc() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["classification_metrics"]["auc_score"]["value"], 0.85);
        assert_eq!(json["classification_metrics"]["recall"], 0.6);
    }

    #[test]
    fn lookup_by_path_and_alias() {
        let r = report();
        assert_eq!(r.lookup(AUC_PATH).unwrap(), 0.85);
        assert_eq!(r.lookup("auc").unwrap(), 0.85);
        assert_eq!(r.lookup("precision").unwrap(), 0.7);
    }

    #[test]
    fn missing_or_non_numeric_metric_is_config_error() {
        let r = report();
        assert!(matches!(r.lookup("classification_metrics.f1"), Err(ChurnError::Config(_))));
        assert!(matches!(
            r.lookup("classification_metrics.auc_score"),
            Err(ChurnError::Config(_))
        ));
    }

    #[test]
    fn gate_defaults() {
        let cfg = GateCfg::default();
        assert_eq!(cfg.metric, AUC_PATH);
        assert_eq!(cfg.threshold, 0.8);
        assert!(GateCfg { threshold: f64::NAN, ..cfg }.validate().is_err());
    }
}
