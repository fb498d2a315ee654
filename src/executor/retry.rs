//! Retry and backoff policy.
//!
//! Total attempts for a test are `max(1, retry + 1)`. Between a non-final
//! failing attempt and the next, the executor sleeps
//! `min(2^(attempt-1) * 1000ms, 30_000ms)` — attempt 1 waits 1s, attempt 2
//! waits 2s, and so on up to the 30s ceiling.

use std::time::Duration;

const MAX_BACKOFF_MS: u64 = 30_000;

/// Total attempts (including the first) for a test's `retry` count.
pub fn total_attempts(retry: usize) -> usize {
    (retry + 1).max(1)
}

/// Backoff duration before the next attempt, given the 1-based attempt
/// number that just failed.
pub fn backoff_delay(attempt: usize) -> Duration {
    let exp = attempt.saturating_sub(1).min(31) as u32;
    let ms = 2u64.saturating_pow(exp).saturating_mul(1000).min(MAX_BACKOFF_MS);
    Duration::from_millis(ms)
}

/// HTTP statuses the executor treats as retryable.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Classifies a `reqwest` transport failure as retryable: connection, DNS,
/// and timeout-class errors are network exceptions; anything
/// else (e.g. a malformed request we built ourselves) is terminal.
pub fn is_retryable_transport_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
