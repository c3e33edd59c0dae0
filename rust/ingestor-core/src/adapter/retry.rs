//! Exponential backoff with jitter for vendor HTTP calls (§4.1, §7).
//!
//! Shaped after `HashdiveScraper::execute_with_retry`'s attempt loop: try,
//! inspect the status, sleep, retry. Generalized to a configurable
//! `RetryConfig` instead of fixed constants, and to compute its own delay
//! from `Retry-After` when the vendor sends one.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// The outcome of one attempt, as classified by the caller.
pub enum Attempt<T> {
    /// The call succeeded.
    Done(T),
    /// The call failed in a way that may succeed on retry; `retry_after` is
    /// the vendor's advertised cooldown, if any.
    Retry {
        /// The transport or status error.
        error: Error,
        /// A server-advertised `Retry-After`, in seconds.
        retry_after: Option<u64>,
    },
    /// The call failed in a way retrying cannot fix.
    Abort(Error),
}

/// Runs `operation` up to `config.max_attempts` times, sleeping an
/// exponentially growing, jittered delay between attempts.
///
/// # Errors
/// Returns the last [`Attempt::Retry`] error wrapped as
/// [`Error::TransientIo`]-shaped context once attempts are exhausted, or
/// immediately propagates an [`Attempt::Abort`].
pub async fn execute_with_retry<F, Fut, T>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Attempt<T>>,
{
    let mut delay = config.base_delay();
    let mut last_err = None;

    for attempt in 1..=config.max_attempts {
        match operation(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Abort(error) => return Err(error),
            Attempt::Retry { error, retry_after } => {
                warn!(attempt, max_attempts = config.max_attempts, %error, "retrying vendor call");
                last_err = Some(error);
                if attempt == config.max_attempts {
                    break;
                }
                let sleep_for = match retry_after {
                    Some(secs) if config.respect_retry_after => Duration::from_secs(secs),
                    _ => jittered(delay),
                };
                tokio::time::sleep(sleep_for).await;
                delay = next_delay(config, delay);
            }
        }
    }

    Err(last_err.unwrap_or(Error::Cancelled))
}

fn next_delay(config: &RetryConfig, current: Duration) -> Duration {
    let scaled = current.mul_f64(config.multiplier);
    scaled.min(config.max_delay())
}

/// Applies +/-20% jitter to `delay` so concurrent chunks don't retry in
/// lockstep against the vendor.
fn jittered(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.8..1.2);
    delay.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            ..RetryConfig::default()
        };
        let result = execute_with_retry(&config, |_| async { Attempt::Done(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            ..RetryConfig::default()
        };
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&config, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Attempt::Retry {
                        error: Error::VendorRequest {
                            status: 503,
                            body: String::new(),
                        },
                        retry_after: None,
                    }
                } else {
                    Attempt::Done("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_the_last_error() {
        let config = RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            ..RetryConfig::default()
        };
        let result: Result<()> = execute_with_retry(&config, |_| async {
            Attempt::Retry {
                error: Error::VendorRequest {
                    status: 500,
                    body: String::new(),
                },
                retry_after: None,
            }
        })
        .await;
        assert!(matches!(result, Err(Error::VendorRequest { status: 500, .. })));
    }

    #[tokio::test]
    async fn abort_short_circuits_without_retrying() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let result: Result<()> = execute_with_retry(&config, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Abort(Error::Auth("bad key".to_owned())) }
        })
        .await;
        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
