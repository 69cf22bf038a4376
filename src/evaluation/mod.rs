//! Model evaluation: metrics, the report file and the promotion gate.

pub mod domain;
pub mod metrics;
pub mod repo_fs;
pub mod service;

pub use domain::{EvalRepo, GateCfg, GateDecision, MetricsReport};
pub use repo_fs::FsEvalRepo;
