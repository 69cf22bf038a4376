//! Command-line entry points, one subcommand per pipeline step.
//!
//! Every command prints a JSON summary on stdout; logs go to stderr. The
//! process exit code is the numeric [`ErrorCode`] of the failure.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::common::config::PipelineCfg;
use crate::common::error::{ChurnError, ChurnResult, ErrorCode};
use crate::common::log;
use crate::explain::domain::ImportanceKind;
use crate::pipeline::service as steps;
use crate::training::domain::ArtifactLocation;

/// Exit code of `gate` when the comparison is false. Distinct from every
/// [`ErrorCode`] so orchestrators can tell "not promoted" from "failed".
pub const GATE_CLOSED_EXIT: u32 = 10;

#[derive(Parser, Debug)]
#[command(name = "churn-pipeline")]
#[command(about = "Churn model pipeline: split, train, evaluate, gate", long_about = None)]
pub struct Cli {
    /// TOML configuration file; CHURN_* variables override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Work directory (overrides paths.work_dir)
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Where to load a model from. Defaults to the stored bundle.
#[derive(clap::Args, Debug, Default)]
pub struct ModelArgs {
    /// Model file, or a directory to scan for one
    #[arg(long, conflicts_with = "bundle")]
    pub model: Option<PathBuf>,

    /// Zip bundle containing the model
    #[arg(long)]
    pub bundle: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the input CSV and write the stratified train/validation/test split
    Split {
        /// Input CSV (overrides data.input)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Train on the stored split and write the model artefact and bundle
    Train,

    /// Score the test split and write evaluation/evaluation.json
    Evaluate {
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Compare a report metric against the threshold
    Gate {
        /// Threshold (overrides gate.threshold)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Dotted metric path or alias (auc, accuracy, precision, recall)
        #[arg(short, long)]
        metric: Option<String>,
    },

    /// Write one probability per row of a feature CSV
    Transform {
        #[command(flatten)]
        model: ModelArgs,

        /// Feature CSV; defaults to the test split
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Predictions file; defaults to transform/predictions.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rank features and write the SHAP analysis config
    Explain {
        #[command(flatten)]
        model: ModelArgs,

        /// Importance kind (gain, total_gain, cover, weight)
        #[arg(long)]
        importance: Option<String>,
    },

    /// Run every step, the gated ones only when the gate passes
    Run {
        /// Input CSV (overrides data.input)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

impl ModelArgs {
    fn location(&self, cfg: &PipelineCfg) -> ArtifactLocation {
        if let Some(bundle) = &self.bundle {
            return ArtifactLocation::Bundle {
                archive: bundle.clone(),
                extract_to: cfg
                    .paths
                    .work_dir
                    .join("extract")
                    .join(&cfg.paths.model_name),
            };
        }
        match &self.model {
            Some(path) if path.is_dir() => ArtifactLocation::Directory(path.clone()),
            Some(path) => ArtifactLocation::File(path.clone()),
            None => steps::bundle_location(cfg),
        }
    }
}

fn emit<T: Serialize>(value: &T) -> ChurnResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| ChurnError::config(format!("serialise output: {err}")))?;
    println!("{json}");
    Ok(())
}

fn load_config(cli: &Cli) -> ChurnResult<PipelineCfg> {
    let mut cfg = PipelineCfg::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.work_dir {
        cfg.paths.work_dir = dir.clone();
    }
    Ok(cfg)
}

fn with_input(cfg: &mut PipelineCfg, input: &Option<PathBuf>) {
    if let Some(path) = input {
        cfg.data.input = Some(path.clone());
    }
}

/// Execute a parsed command; returns the process exit code on success.
pub fn execute(cli: &Cli) -> ChurnResult<u32> {
    let mut cfg = load_config(cli)?;
    log::init(&cfg.log)?;
    tracing::debug!(work_dir = %cfg.paths.work_dir.display(), "configuration loaded");

    match &cli.command {
        Command::Split { input } => {
            with_input(&mut cfg, input);
            emit(&steps::split_step(&cfg)?)?;
        }
        Command::Train => {
            let (trained, stored) = steps::train_step(&cfg)?;
            emit(&serde_json::json!({
                "artifact": stored.artifact,
                "bundle": stored.bundle,
                "trees": trained.model.trees.len(),
                "train_auc": trained.summary.final_train_auc(),
                "eval_auc": trained.summary.final_eval_auc(),
            }))?;
        }
        Command::Evaluate { model } => {
            let (report, _) = steps::evaluate_step(&cfg, &model.location(&cfg))?;
            emit(&report)?;
        }
        Command::Gate { threshold, metric } => {
            if let Some(threshold) = threshold {
                cfg.gate.threshold = *threshold;
            }
            if let Some(metric) = metric {
                cfg.gate.metric = metric.clone();
            }
            cfg.gate.validate()?;
            let decision = steps::gate_step(&cfg)?;
            emit(&decision)?;
            if !decision.passed {
                return Ok(GATE_CLOSED_EXIT);
            }
        }
        Command::Transform {
            model,
            input,
            output,
        } => {
            let output = steps::transform_step(
                &cfg,
                &model.location(&cfg),
                input.as_deref(),
                output.as_deref(),
            )?;
            emit(&output)?;
        }
        Command::Explain { model, importance } => {
            if let Some(kind) = importance {
                cfg.explain.importance = kind.parse::<ImportanceKind>()?;
            }
            let output = steps::explain_step(&cfg, &model.location(&cfg))?;
            emit(&serde_json::json!({
                "analysis_config": output.analysis_config,
                "importance_file": output.importance_file,
                "importance": output.importance,
            }))?;
        }
        Command::Run { input } => {
            with_input(&mut cfg, input);
            emit(&steps::run(&cfg)?)?;
        }
    }
    Ok(ErrorCode::Ok as u32)
}

/// Parse the process arguments, execute, and map failures to exit codes.
pub fn run() -> u32 {
    let cli = Cli::parse();
    match execute(&cli) {
        Ok(code) => code,
        Err(err) => {
            let code = err.code();
            tracing::error!(kind = code.as_str(), error = %err, "command failed");
            eprintln!("churn-pipeline: {err}");
            code as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_config_after_subcommand() {
        let cli = Cli::try_parse_from([
            "churn-pipeline",
            "gate",
            "--threshold",
            "0.5",
            "--config",
            "pipeline.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("pipeline.toml")));
        assert!(matches!(
            cli.command,
            Command::Gate {
                threshold: Some(t),
                metric: None
            } if t == 0.5
        ));
    }

    #[test]
    fn explicit_model_path_wins_over_bundle_default() {
        let cfg = PipelineCfg::default();
        let args = ModelArgs {
            model: Some(PathBuf::from("does/not/exist/churn-model")),
            bundle: None,
        };
        assert_eq!(
            args.location(&cfg),
            ArtifactLocation::File(PathBuf::from("does/not/exist/churn-model"))
        );
        assert_eq!(ModelArgs::default().location(&cfg), steps::bundle_location(&cfg));
    }
}
