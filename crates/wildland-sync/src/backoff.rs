use std::future::Future;
use std::time::Duration;

use wildland_storage::StorageError;

/// Bounded exponential backoff for sync-layer retries (SPEC_FULL.md §12.3):
/// starts at 250ms, doubles each attempt, caps at 8s, gives up after 5
/// attempts. Retries only `BackendTimeout`/`BackendIo` — every other
/// `StorageError` is non-retryable and returned immediately.
const INITIAL_DELAY: Duration = Duration::from_millis(250);
const MAX_DELAY: Duration = Duration::from_secs(8);
const MAX_ATTEMPTS: u32 = 5;

pub async fn with_backoff<F, Fut, T>(mut f: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut delay = INITIAL_DELAY;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                tracing::warn!("retryable sync error (attempt {attempt}/{MAX_ATTEMPTS}): {e}");
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_DELAY);
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_retryable(e: &StorageError) -> bool {
    matches!(e, StorageError::BackendTimeout | StorageError::BackendIo(_))
}
