//! Churn prediction pipeline: stratified split, gradient-boosted trees,
//! evaluation and a promotion gate, with batch scoring and an
//! explainability handoff behind the gate.

pub mod api;
pub mod common;
pub mod data;
pub mod evaluation;
pub mod explain;
pub mod inference;
pub mod pipeline;
pub mod training;

pub use common::config::PipelineCfg;
pub use common::error::{ChurnError, ChurnResult, ErrorCode};
