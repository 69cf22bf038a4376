//! Batch transform output types.

use std::path::PathBuf;

use serde::Serialize;

/// Result of scoring a feature table into a predictions file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransformOutput {
    pub path: PathBuf,
    pub rows: usize,
    /// Share of rows at or above the decision threshold.
    pub positive_share: f64,
}
