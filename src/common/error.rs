//! Error handling primitives shared across the core.
//!
//! Every stage returns [`ChurnResult`]; the [`ErrorCode`] attached to each
//! variant is what the command line surfaces as the process exit status.

use std::path::{Path, PathBuf};

/// Stable error codes reported to the orchestrator.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Malformed or missing input data or schema.
    Input = 1,
    /// Model fitting failed.
    Training = 2,
    /// Model artefact missing, corrupt or unrecognised.
    ModelLoad = 3,
    /// Test data does not match the model's schema.
    Evaluation = 4,
    /// Missing or invalid configuration.
    Config = 5,
    /// Filesystem failure.
    Io = 6,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::Input => "input_error",
            ErrorCode::Training => "training_error",
            ErrorCode::ModelLoad => "model_load_error",
            ErrorCode::Evaluation => "evaluation_error",
            ErrorCode::Config => "config_error",
            ErrorCode::Io => "io_error",
        }
    }
}

/// Canonical error type for the core.
#[derive(Debug, thiserror::Error)]
pub enum ChurnError {
    #[error("input error: {0}")]
    Input(String),
    #[error("training error: {0}")]
    Training(String),
    #[error("model load error: {0}")]
    ModelLoad(String),
    #[error("evaluation error: {0}")]
    Evaluation(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result alias used throughout the crate.
pub type ChurnResult<T> = Result<T, ChurnError>;

impl ChurnError {
    /// Validation helper.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// IO error helper that keeps the offending path.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Machine parsable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ChurnError::Input(_) => ErrorCode::Input,
            ChurnError::Training(_) => ErrorCode::Training,
            ChurnError::ModelLoad(_) => ErrorCode::ModelLoad,
            ChurnError::Evaluation(_) => ErrorCode::Evaluation,
            ChurnError::Config(_) => ErrorCode::Config,
            ChurnError::Io { .. } => ErrorCode::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Ok as u32, 0);
        assert_eq!(ErrorCode::Input as u32, 1);
        assert_eq!(ErrorCode::Training as u32, 2);
        assert_eq!(ErrorCode::ModelLoad as u32, 3);
        assert_eq!(ErrorCode::Evaluation as u32, 4);
        assert_eq!(ErrorCode::Config as u32, 5);
        assert_eq!(ErrorCode::Io as u32, 6);
    }

    #[test]
    fn variants_map_to_codes() {
        assert_eq!(ChurnError::input("x").code(), ErrorCode::Input);
        assert_eq!(ChurnError::evaluation("x").code(), ErrorCode::Evaluation);
        let io = ChurnError::io(
            Path::new("/tmp/x"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(io.code(), ErrorCode::Io);
        assert!(io.to_string().contains("/tmp/x"));
    }
}
