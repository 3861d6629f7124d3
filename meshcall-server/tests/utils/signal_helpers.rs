use anyhow::Result;
use std::future::Future;
use std::time::{Duration, Instant};

/// Timeout for signal exchange operations (ms).
pub const SIGNAL_TIMEOUT_MS: u64 = 5000;

/// Poll `check` until it yields true or `timeout_ms` elapses.
pub async fn wait_until<F, Fut>(timeout_ms: u64, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    loop {
        if check().await {
            return Ok(());
        }
        if start.elapsed() > timeout {
            anyhow::bail!("Timeout after {} ms", timeout_ms);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
