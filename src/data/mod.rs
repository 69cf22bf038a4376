//! Data domain: CSV ingest, schema validation, stratified splitting and
//! persistence of the resulting subsets.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{Dataset, FeatureTable, Schema, Split, SplitCfg, SplitPart};
