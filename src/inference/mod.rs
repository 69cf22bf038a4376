//! Batch scoring of feature tables with a trained model.

pub mod domain;
pub mod service;

pub use domain::TransformOutput;
