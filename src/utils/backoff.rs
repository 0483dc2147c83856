//! Exponential backoff utilities for retry operations.

use crate::constants::{MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};
use std::time::Duration;

/// Performs exponential backoff with delay.
///
/// Delays follow 10ms, 20ms, 40ms... capped at 500ms.
///
/// # Arguments
/// * `attempt` - Current retry attempt number (0-based)
///
/// # Returns
/// * `u32` - The next attempt number (incremented)
pub async fn exponential_backoff_with_delay(attempt: u32) -> u32 {
    let delay = std::cmp::min(STARTING_BACKOFF_DELAY_MS * (1 << attempt), MAX_BACKOFF_DELAY_MS);
    tokio::time::sleep(Duration::from_millis(delay)).await;
    attempt.saturating_add(1)
}

/// Retry strategy for fetch adapters: exponential from 10ms, capped count.
pub fn fetch_retry_strategy() -> impl Iterator<Item = Duration> {
    tokio_retry::strategy::ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
        .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
        .take(crate::constants::FETCH_RETRY_ATTEMPTS)
}
