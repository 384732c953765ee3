use std::time::{Duration, Instant};

/// Retries `check` with exponential backoff until it passes or `limit` elapses.
///
/// The check runs immediately at first, then with a doubling delay capped at
/// 100ms. Panics with the last failure message on timeout.
pub async fn eventually<F>(limit: Duration, mut check: F)
where
    F: FnMut() -> Result<(), String>,
{
    let deadline = Instant::now() + limit;
    let mut wait = Duration::from_millis(1);
    loop {
        match check() {
            Ok(()) => return,
            Err(msg) => {
                if Instant::now() > deadline {
                    panic!("condition failed to hold within {limit:?}: {msg}");
                }
                tokio::time::sleep(wait).await;
                wait = (wait * 2).min(Duration::from_millis(100));
            }
        }
    }
}
