//! Resilience pipeline (C6): retries a unary async operation on
//! `ConcurrencyConflict` alone, with a small fixed-then-jittered schedule.
//!
//! Shaped like the pack's other retry combinator
//! (`stormasm-ioxnu22july/backoff`: a small owned schedule plus a
//! `retry_with_backoff` method taking a retryable closure) but narrower —
//! this one retries exactly one error kind on a schedule the caller does not
//! configure, because write retries outside that one case are the caller's
//! responsibility (a write may have partially succeeded).

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::error::EngineError;

/// Total attempts, including the first, before giving up and returning the
/// last `ConcurrencyConflict`.
const MAX_ATTEMPTS: u32 = 5;

/// Runs `op`, retrying only on [`EngineError::ConcurrencyConflict`], up to
/// [`MAX_ATTEMPTS`] total attempts with delays of 0 ms, 30 ms, then 1 s (each
/// jittered) between attempts. Any other error returns immediately.
pub async fn resilient<F, Fut, T>(operation_name: &'static str, mut op: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(EngineError::ConcurrencyConflict) if attempt < MAX_ATTEMPTS => {
                metrics::histogram!("promise_engine_resilience_retry_attempt", "operation" => operation_name)
                    .record(f64::from(attempt));
                sleep(jittered_delay(attempt)).await;
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

fn jittered_delay(failed_attempt: u32) -> Duration {
    let base = match failed_attempt {
        1 => return Duration::ZERO,
        2 => Duration::from_millis(30),
        _ => Duration::from_secs(1),
    };
    let quarter_ms = (base.as_millis() as u64 / 4).max(1);
    let jitter_ms = rand::rng().random_range(0..=quarter_ms);
    base + Duration::from_millis(jitter_ms)
}
