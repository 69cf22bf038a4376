//! Tracing setup and the stage event helper.
//!
//! JSON lines are the default output so orchestrator log collectors can parse
//! them; the text format is meant for local runs.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

use crate::common::config::{LogCfg, LogFormat};
use crate::common::error::{ChurnError, ChurnResult, ErrorCode};

static INSTALLED: OnceLock<Result<(), String>> = OnceLock::new();

/// Install the global subscriber. Subsequent calls return the first outcome.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(cfg: &LogCfg) -> ChurnResult<()> {
    INSTALLED
        .get_or_init(|| install(cfg))
        .clone()
        .map_err(ChurnError::config)
}

fn install(cfg: &LogCfg) -> Result<(), String> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level)
            .map_err(|err| format!("log.level {:?}: {err}", cfg.level))?,
    };

    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = match cfg.format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|err| format!("tracing subscriber: {err}"))
}

/// Emit the completion event of a pipeline stage.
pub fn stage_done(stage: &str, code: ErrorCode, dur_ms: u128) {
    if code == ErrorCode::Ok {
        tracing::info!(stage, code = code as u32, dur_ms, "stage finished");
    } else {
        tracing::error!(
            stage,
            code = code as u32,
            kind = code.as_str(),
            dur_ms,
            "stage failed"
        );
    }
}
