//! Values returned by the pipeline steps.

use std::path::PathBuf;

use serde::Serialize;

use crate::data::domain::SplitManifest;
use crate::evaluation::domain::{GateDecision, MetricsReport};
use crate::inference::domain::TransformOutput;

/// Steps that only run after the gate passes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GatedOutputs {
    pub transform: TransformOutput,
    pub analysis_config: PathBuf,
    pub importance_file: PathBuf,
}

/// Everything a full run produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub manifest: SplitManifest,
    pub artifact: PathBuf,
    pub bundle: PathBuf,
    pub report_path: PathBuf,
    pub report: MetricsReport,
    pub decision: GateDecision,
    /// `None` when the gate did not pass.
    pub gated: Option<GatedOutputs>,
}
