//! Service layer tying the trainer to the model repository.

use crate::common::error::ChurnResult;
use crate::common::time;
use crate::data::domain::Dataset;

use super::domain::{ModelRepo, StoredModel, TrainConfig, TrainedModel, Trainer};
use super::gbdt::GbdtTrainer;

/// Fit a model on `train`, logging per-round AUC against `eval` when given.
pub fn train(
    train: &Dataset,
    eval: Option<&Dataset>,
    cfg: &TrainConfig,
) -> ChurnResult<TrainedModel> {
    time::timed("train", || {
        let trainer = GbdtTrainer::new(cfg.clone())?;
        trainer.train(train, eval)
    })
}

/// Train and persist in one call; returns the stored paths alongside the model.
pub fn train_and_store(
    repo: &dyn ModelRepo,
    name: &str,
    train_set: &Dataset,
    eval: Option<&Dataset>,
    cfg: &TrainConfig,
) -> ChurnResult<(TrainedModel, StoredModel)> {
    let trained = train(train_set, eval, cfg)?;
    let stored = repo.put_model(name, &trained.model)?;
    Ok((trained, stored))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ChurnError;
    use crate::data::domain::{FeatureTable, Schema};
    use crate::training::domain::ArtifactLocation;
    use crate::training::repo_fs::FsModelRepo;
    use tempfile::tempdir;

    fn toy() -> Dataset {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let labels = (0..40).map(|i| u8::from(i >= 20)).collect();
        let table = FeatureTable::new(Schema::numeric(["x", "noise"]).unwrap(), rows).unwrap();
        Dataset::new(table, "label", labels).unwrap()
    }

    #[test]
    fn trained_model_is_stored_and_reloaded() {
        let dir = tempdir().unwrap();
        let repo = FsModelRepo::new(dir.path());
        let cfg = TrainConfig {
            rounds: 5,
            ..TrainConfig::default()
        };
        let data = toy();
        let (trained, stored) = train_and_store(&repo, "churn", &data, Some(&data), &cfg).unwrap();
        assert_eq!(trained.summary.rounds, 5);
        let loaded = repo.get_model(&ArtifactLocation::File(stored.artifact)).unwrap();
        assert_eq!(loaded, trained.model);
    }

    #[test]
    fn invalid_config_is_rejected_before_training() {
        let cfg = TrainConfig {
            rounds: 0,
            ..TrainConfig::default()
        };
        assert!(matches!(train(&toy(), None, &cfg), Err(ChurnError::Config(_))));
    }
}
