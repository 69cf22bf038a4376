//! Pipeline steps over the work directory, and the in-process runner.
//!
//! Each step reads what the previous one persisted, so a step can be run
//! on its own by an external orchestrator or chained by [`run`].

use std::path::{Path, PathBuf};

use crate::common::config::PipelineCfg;
use crate::common::error::{ChurnError, ChurnResult};
use crate::common::time;
use crate::data::domain::{DataRepo, SplitManifest, SplitPart};
use crate::data::repo_fs::FsDataRepo;
use crate::data::service as data;
use crate::evaluation::domain::{EvalRepo, GateDecision, MetricsReport};
use crate::evaluation::repo_fs::FsEvalRepo;
use crate::evaluation::service as evaluation;
use crate::explain::domain::ExplainOutput;
use crate::explain::service as explain;
use crate::inference::domain::TransformOutput;
use crate::inference::service as inference;
use crate::training::domain::{ArtifactLocation, ModelRepo, StoredModel, TrainedModel};
use crate::training::repo_fs::{self as model_fs, FsModelRepo};
use crate::training::service as training;

use super::domain::{GatedOutputs, PipelineOutcome};

pub const PREDICTIONS_FILE: &str = "predictions.csv";

/// Bundle of the configured model, extracted under `<work_dir>/extract`.
pub fn bundle_location(cfg: &PipelineCfg) -> ArtifactLocation {
    let models = FsModelRepo::new(&cfg.paths.work_dir);
    ArtifactLocation::Bundle {
        archive: models.bundle_path(&cfg.paths.model_name),
        extract_to: cfg
            .paths
            .work_dir
            .join("extract")
            .join(&cfg.paths.model_name),
    }
}

/// Load the raw CSV, split it and persist the three subsets.
pub fn split_step(cfg: &PipelineCfg) -> ChurnResult<SplitManifest> {
    let input = cfg
        .data
        .input
        .as_deref()
        .ok_or_else(|| ChurnError::config("data.input is not set"))?;
    let dataset = time::timed("load", || data::load_dataset(input, &cfg.data))?;
    time::timed("split", || {
        let split = data::split_dataset(&dataset, &cfg.split)?;
        FsDataRepo::new(&cfg.paths.work_dir).put_split(&split)
    })
}

/// Train on the persisted train subset, validation as the eval set.
pub fn train_step(cfg: &PipelineCfg) -> ChurnResult<(TrainedModel, StoredModel)> {
    let repo = FsDataRepo::new(&cfg.paths.work_dir);
    let train = repo.get_part(SplitPart::Train)?;
    let validation = repo.get_part(SplitPart::Validation)?;
    training::train_and_store(
        &FsModelRepo::new(&cfg.paths.work_dir),
        &cfg.paths.model_name,
        &train,
        Some(&validation),
        &cfg.train,
    )
}

/// Score the test subset and persist the report.
pub fn evaluate_step(
    cfg: &PipelineCfg,
    location: &ArtifactLocation,
) -> ChurnResult<(MetricsReport, PathBuf)> {
    let test = FsDataRepo::new(&cfg.paths.work_dir).get_part(SplitPart::Test)?;
    let bytes = model_fs::read_artifact(location)?;
    let report = evaluation::score(&bytes, &test)?;
    let path = FsEvalRepo::new(&cfg.paths.work_dir).put_report(&report)?;
    Ok((report, path))
}

/// Apply the gate to the persisted report.
pub fn gate_step(cfg: &PipelineCfg) -> ChurnResult<GateDecision> {
    time::timed("gate", || {
        let report = FsEvalRepo::new(&cfg.paths.work_dir).get_report()?;
        evaluation::gate(&report, &cfg.gate)
    })
}

/// Score `input` (the test subset when `None`) into `output`
/// (`<work_dir>/transform/predictions.csv` when `None`).
pub fn transform_step(
    cfg: &PipelineCfg,
    location: &ArtifactLocation,
    input: Option<&Path>,
    output: Option<&Path>,
) -> ChurnResult<TransformOutput> {
    let model = FsModelRepo::new(&cfg.paths.work_dir).get_model(location)?;
    let table = match input {
        Some(path) => data::load_features(path, &cfg.data)?,
        None => FsDataRepo::new(&cfg.paths.work_dir)
            .get_part(SplitPart::Test)?
            .table()
            .clone(),
    };
    let default_out;
    let out = match output {
        Some(path) => path,
        None => {
            default_out = cfg.paths.work_dir.join("transform").join(PREDICTIONS_FILE);
            &default_out
        }
    };
    inference::transform(&model, &table, out)
}

/// Importance ranking and analysis config under `<work_dir>/explain`.
pub fn explain_step(cfg: &PipelineCfg, location: &ArtifactLocation) -> ChurnResult<ExplainOutput> {
    let model = FsModelRepo::new(&cfg.paths.work_dir).get_model(location)?;
    explain::explain(
        &model,
        &cfg.explain,
        &cfg.paths.work_dir.join("explain"),
        &cfg.paths.model_name,
    )
}

/// Split, train, evaluate and gate; run the gated steps when the gate passes.
pub fn run(cfg: &PipelineCfg) -> ChurnResult<PipelineOutcome> {
    time::timed("pipeline", || {
        let manifest = split_step(cfg)?;
        let (trained, stored) = train_step(cfg)?;
        tracing::info!(
            trees = trained.model.trees.len(),
            eval_auc = trained.summary.final_eval_auc().unwrap_or(f64::NAN),
            "candidate model trained"
        );

        let location = bundle_location(cfg);
        let (report, report_path) = evaluate_step(cfg, &location)?;
        let decision = gate_step(cfg)?;

        let gated = if decision.passed {
            let transform = transform_step(cfg, &location, None, None)?;
            let explained = explain_step(cfg, &location)?;
            Some(GatedOutputs {
                transform,
                analysis_config: explained.analysis_config,
                importance_file: explained.importance_file,
            })
        } else {
            tracing::warn!(
                metric = %decision.metric,
                value = decision.value,
                threshold = decision.threshold,
                "gate not passed, skipping transform and explain"
            );
            None
        };

        Ok(PipelineOutcome {
            manifest,
            artifact: stored.artifact,
            bundle: stored.bundle,
            report_path,
            report,
            decision,
            gated,
        })
    })
}
