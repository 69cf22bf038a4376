//! Runtime configuration loaded from an optional TOML file and the environment.
//!
//! Layering order: built-in defaults, then the file, then `CHURN_*` variables.
//! The resulting snapshot is validated once and handed by reference to each
//! stage; nothing here is global.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::error::{ChurnError, ChurnResult};
use crate::data::domain::SplitCfg;
use crate::evaluation::domain::GateCfg;
use crate::explain::domain::ExplainCfg;
use crate::training::domain::TrainConfig;

/// Where the raw CSV lives and how to interpret its columns.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DataCfg {
    pub input: Option<PathBuf>,
    pub label: String,
    pub has_header: bool,
    /// Column names for header-less files.
    pub columns: Option<Vec<String>>,
    /// Identifier columns that never reach the model.
    pub drop_columns: Vec<String>,
}

impl Default for DataCfg {
    fn default() -> Self {
        Self {
            input: None,
            label: "label".to_string(),
            has_header: true,
            columns: None,
            drop_columns: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsCfg {
    pub work_dir: PathBuf,
    pub model_name: String,
}

impl Default for PathsCfg {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./work"),
            model_name: "churn".to_string(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogCfg {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogCfg {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Snapshot of configuration values consumed by the pipeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineCfg {
    pub data: DataCfg,
    pub split: SplitCfg,
    pub train: TrainConfig,
    pub gate: GateCfg,
    pub explain: ExplainCfg,
    pub paths: PathsCfg,
    pub log: LogCfg,
}

impl PipelineCfg {
    /// Load defaults, merge the optional TOML file and the process environment.
    pub fn load(path: Option<&Path>) -> ChurnResult<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> ChurnResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| ChurnError::io(path, source))?;
        Self::from_toml_str(&text)
            .map_err(|err| ChurnError::config(format!("{}: {err}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> ChurnResult<Self> {
        toml::from_str(text).map_err(|err| ChurnError::config(err.to_string()))
    }

    /// Override selected keys from `CHURN_*` variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> ChurnResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("CHURN_WORK_DIR") {
            self.paths.work_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("CHURN_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(raw) = lookup("CHURN_SEED") {
            let seed: u64 = raw
                .parse()
                .map_err(|_| ChurnError::config(format!("CHURN_SEED is not an integer: {raw}")))?;
            self.split.seed = seed;
            self.train.seed = seed;
        }
        if let Some(raw) = lookup("CHURN_GATE_THRESHOLD") {
            self.gate.threshold = raw.parse().map_err(|_| {
                ChurnError::config(format!("CHURN_GATE_THRESHOLD is not a number: {raw}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> ChurnResult<()> {
        if self.data.label.trim().is_empty() {
            return Err(ChurnError::config("data.label must not be empty"));
        }
        if !self.data.has_header && self.data.columns.is_none() {
            return Err(ChurnError::config(
                "data.columns is required when data.has_header is false",
            ));
        }
        if self.paths.model_name.trim().is_empty() {
            return Err(ChurnError::config("paths.model_name must not be empty"));
        }
        self.split.validate()?;
        self.train.validate()?;
        self.gate.validate()?;
        self.explain.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PipelineCfg::default();
        assert_eq!(cfg.data.label, "label");
        assert_eq!(cfg.split.seed, 42);
        assert_eq!(cfg.train.max_depth, 5);
        assert_eq!(cfg.train.rounds, 100);
        assert!((cfg.train.learning_rate - 0.2).abs() < 1e-12);
        assert!((cfg.gate.threshold - 0.8).abs() < 1e-12);
        cfg.validate().unwrap();
    }

    #[test]
    fn toml_sections_override_defaults() {
        let cfg = PipelineCfg::from_toml_str(
            r#"
            [data]
            label = "Exited"
            drop_columns = ["RowNumber", "CustomerId"]

            [train]
            rounds = 20
            max_depth = 3

            [gate]
            threshold = 0.7
            "#,
        )
        .unwrap();
        assert_eq!(cfg.data.label, "Exited");
        assert_eq!(cfg.data.drop_columns.len(), 2);
        assert_eq!(cfg.train.rounds, 20);
        assert_eq!(cfg.train.max_depth, 3);
        assert!((cfg.train.learning_rate - 0.2).abs() < 1e-12);
        assert!((cfg.gate.threshold - 0.7).abs() < 1e-12);
    }

    #[test]
    fn env_overrides_apply_to_both_seeds() {
        let mut cfg = PipelineCfg::default();
        cfg.apply_env(|key| match key {
            "CHURN_SEED" => Some("7".to_string()),
            "CHURN_WORK_DIR" => Some("/tmp/churn".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.split.seed, 7);
        assert_eq!(cfg.train.seed, 7);
        assert_eq!(cfg.paths.work_dir, PathBuf::from("/tmp/churn"));
    }

    #[test]
    fn bad_env_value_is_config_error() {
        let mut cfg = PipelineCfg::default();
        let err = cfg
            .apply_env(|key| (key == "CHURN_GATE_THRESHOLD").then(|| "high".to_string()))
            .unwrap_err();
        assert!(matches!(err, ChurnError::Config(_)));
    }

    #[test]
    fn headerless_input_needs_columns() {
        let mut cfg = PipelineCfg::default();
        cfg.data.has_header = false;
        assert!(matches!(cfg.validate(), Err(ChurnError::Config(_))));
    }
}
