//! Evaluation reports on disk at `<work_dir>/evaluation/evaluation.json`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::common::error::{ChurnError, ChurnResult};

use super::domain::{EvalRepo, MetricsReport};

pub const REPORT_FILE: &str = "evaluation.json";

pub struct FsEvalRepo {
    root: PathBuf,
}

impl FsEvalRepo {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            root: work_dir.join("evaluation"),
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join(REPORT_FILE)
    }
}

impl EvalRepo for FsEvalRepo {
    fn put_report(&self, report: &MetricsReport) -> ChurnResult<PathBuf> {
        fs::create_dir_all(&self.root).map_err(|source| ChurnError::io(&self.root, source))?;
        let path = self.report_path();
        let json = serde_json::to_vec_pretty(report)
            .map_err(|err| ChurnError::evaluation(format!("serialise report: {err}")))?;
        fs::write(&path, json).map_err(|source| ChurnError::io(&path, source))?;
        tracing::info!(path = %path.display(), "evaluation report written");
        Ok(path)
    }

    fn get_report(&self) -> ChurnResult<MetricsReport> {
        let path = self.report_path();
        let bytes = fs::read(&path).map_err(|source| ChurnError::io(&path, source))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ChurnError::config(format!("{}: {err}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn report_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let repo = FsEvalRepo::new(dir.path());
        let report = MetricsReport::new(0.75, 0.5, 0.25, 0.9);
        let path = repo.put_report(&report).unwrap();
        assert!(path.ends_with("evaluation/evaluation.json"));
        assert_eq!(repo.get_report().unwrap(), report);
    }

    #[test]
    fn malformed_report_is_config_error() {
        let dir = tempdir().unwrap();
        let repo = FsEvalRepo::new(dir.path());
        fs::create_dir_all(dir.path().join("evaluation")).unwrap();
        fs::write(repo.report_path(), br#"{"classification_metrics":{}}"#).unwrap();
        assert!(matches!(repo.get_report(), Err(ChurnError::Config(_))));
    }
}
