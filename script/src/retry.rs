use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry an async operation with exponential backoff.
///
/// `op` receives the 1-based attempt number. `retryable` decides whether an
/// error is worth another attempt; anything else is returned immediately.
pub async fn retry_async<F, Fut, T, E, P>(
    mut op: F,
    attempts: usize,
    initial_delay: Duration,
    retryable: P,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut delay = initial_delay;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts && retryable(&e) => {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
