//! Process-facing entry points.

pub mod cli;
