//! Simple time helpers used by multiple services.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::common::error::ChurnResult;
use crate::common::log;

/// Current timestamp in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Run a stage body and emit its completion event with the elapsed time.
pub fn timed<T>(stage: &str, body: impl FnOnce() -> ChurnResult<T>) -> ChurnResult<T> {
    let start = Instant::now();
    tracing::debug!(stage, "stage started");
    let result = body();
    let code = match &result {
        Ok(_) => crate::common::error::ErrorCode::Ok,
        Err(err) => err.code(),
    };
    log::stage_done(stage, code, start.elapsed().as_millis());
    result
}
