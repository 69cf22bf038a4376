//! Gradient-boosted tree training and model artefact storage.

pub mod artifact;
pub mod domain;
pub mod gbdt;
pub mod repo_fs;
pub mod service;

pub use domain::{ArtifactLocation, BoostedModel, ModelRepo, TrainConfig, Trainer};
pub use gbdt::GbdtTrainer;
pub use repo_fs::FsModelRepo;
