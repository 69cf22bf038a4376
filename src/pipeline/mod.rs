//! End-to-end orchestration of the churn pipeline steps.

pub mod domain;
pub mod service;

pub use domain::{GatedOutputs, PipelineOutcome};
pub use service::run;
