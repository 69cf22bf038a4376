//! Explainability handoff: importance ranking and the SHAP analysis config.

pub mod domain;
pub mod service;

pub use domain::{AnalysisConfig, ExplainCfg, ImportanceKind};
