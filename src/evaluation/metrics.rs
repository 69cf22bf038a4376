//! Binary classification metrics.
//!
//! Accuracy, precision and recall take thresholded labels; AUC takes the raw
//! scores. Never feed thresholded labels to [`roc_auc`].

use crate::common::error::{ChurnError, ChurnResult};

/// Decision threshold on the positive-class probability.
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConfusionMatrix {
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    pub fn_: u64,
}

impl ConfusionMatrix {
    pub fn from_labels(truth: &[u8], predicted: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in truth.iter().zip(predicted) {
            match (t, p) {
                (1, 1) => cm.tp += 1,
                (0, 1) => cm.fp += 1,
                (1, _) => cm.fn_ += 1,
                _ => cm.tn += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> u64 {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// `TP / (TP + FP)`, 0.0 when nothing was predicted positive.
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// `TP / (TP + FN)`, 0.0 when there are no positives.
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// `1` where `score >= cut`.
pub fn threshold(scores: &[f64], cut: f64) -> Vec<u8> {
    scores.iter().map(|&s| u8::from(s >= cut)).collect()
}

/// Area under the ROC curve via the rank statistic, ties averaged.
pub fn roc_auc(truth: &[u8], scores: &[f64]) -> ChurnResult<f64> {
    if truth.len() != scores.len() {
        return Err(ChurnError::evaluation(format!(
            "{} labels for {} scores",
            truth.len(),
            scores.len()
        )));
    }
    let positives = truth.iter().filter(|&&y| y == 1).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(ChurnError::evaluation(
            "AUC is undefined when only one class is present",
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0f64;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // 1-based ranks start+1..=end share their mean.
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end].iter().filter(|&&i| truth[i] == 1).count();
        positive_rank_sum += avg_rank * tied_positives as f64;
        start = end;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Ok((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confusion_counts_and_ratios() {
        let truth = [1, 1, 0, 0, 1];
        let pred = [1, 0, 1, 0, 1];
        let cm = ConfusionMatrix::from_labels(&truth, &pred);
        assert_eq!(cm, ConfusionMatrix { tp: 2, fp: 1, tn: 1, fn_: 1 });
        assert!((cm.accuracy() - 0.6).abs() < 1e-12);
        assert!((cm.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.recall() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn zero_denominators_yield_zero() {
        let cm = ConfusionMatrix::from_labels(&[0, 0], &[0, 0]);
        assert_eq!(cm.precision(), 0.0);
        assert_eq!(cm.recall(), 0.0);
        assert_eq!(cm.accuracy(), 1.0);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(threshold(&[0.49, 0.5, 0.9], DECISION_THRESHOLD), vec![0, 1, 1]);
    }

    #[test]
    fn perfect_ranking_is_one() {
        let auc = roc_auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]).unwrap();
        assert!((auc - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reversed_ranking_is_zero() {
        let auc = roc_auc(&[1, 1, 0, 0], &[0.1, 0.2, 0.8, 0.9]).unwrap();
        assert!(auc.abs() < 1e-12);
    }

    #[test]
    fn constant_scores_are_one_half() {
        let auc = roc_auc(&[0, 1, 0, 1, 1], &[0.3; 5]).unwrap();
        assert!((auc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ties_are_averaged() {
        // Pairs (pos, neg): (0.5 vs 0.5) counts 1/2, (0.5 vs 0.1) counts 1.
        let auc = roc_auc(&[1, 0, 0], &[0.5, 0.5, 0.1]).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn auc_uses_resolution_that_thresholding_loses() {
        let truth = [0, 1, 0, 1];
        let scores = [0.1, 0.2, 0.3, 0.4];
        let raw = roc_auc(&truth, &scores).unwrap();
        let binarised = roc_auc(&truth, &[0.0; 4]).unwrap();
        assert!((raw - 0.75).abs() < 1e-12);
        assert!((binarised - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_class_is_evaluation_error() {
        assert!(matches!(
            roc_auc(&[1, 1], &[0.2, 0.4]),
            Err(ChurnError::Evaluation(_))
        ));
    }
}
