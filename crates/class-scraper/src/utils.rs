use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitBound {
    /// Evaluate the predicate at most this many times.
    Attempts(u32),
    /// Keep evaluating until this much time has passed.
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("Condition not met after {0} attempt(s)")]
    Exhausted(u32),
    #[error("Condition not met within {0:?}")]
    TimedOut(Duration),
    #[error("Wait cancelled")]
    Cancelled,
}

/// Polls `predicate` every `interval` until it yields `true`.
///
/// The predicate runs once straight away. Errors a caller may hit while
/// probing the page should be folded into `false` by the predicate itself.
pub async fn await_condition<F, Fut>(
    mut predicate: F,
    interval: Duration,
    bound: WaitBound,
    cancel: &CancellationToken,
) -> Result<(), WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }

        attempts += 1;
        if predicate().await {
            log::debug!("Condition met after {} attempt(s)", attempts);
            return Ok(());
        }

        match bound {
            WaitBound::Attempts(max) if attempts >= max => {
                return Err(WaitError::Exhausted(attempts));
            }
            WaitBound::Timeout(limit) if started.elapsed() >= limit => {
                return Err(WaitError::TimedOut(limit));
            }
            _ => {}
        }

        let pause = match bound {
            WaitBound::Timeout(limit) => interval.min(limit.saturating_sub(started.elapsed())),
            WaitBound::Attempts(_) => interval,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_condition_met_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = await_condition(
            || {
                let counter = counter.clone();
                async move { counter.fetch_add(1, Ordering::SeqCst) + 1 >= 3 }
            },
            Duration::from_millis(100),
            WaitBound::Attempts(50),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result, Ok(()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = await_condition(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    false
                }
            },
            Duration::from_millis(100),
            WaitBound::Attempts(50),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result, Err(WaitError::Exhausted(50)));
        assert_eq!(calls.load(Ordering::SeqCst), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_elapses() {
        let started = Instant::now();

        let result = await_condition(
            || async { false },
            Duration::from_secs(1),
            WaitBound::Timeout(Duration::from_secs(300)),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result, Err(WaitError::TimedOut(Duration::from_secs(300))));
        assert!(started.elapsed() >= Duration::from_secs(300));
        assert!(started.elapsed() < Duration::from_secs(302));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let token = CancellationToken::new();
        let child = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            child.cancel();
        });

        let started = Instant::now();
        let result = await_condition(
            || async { false },
            Duration::from_secs(1),
            WaitBound::Timeout(Duration::from_secs(300)),
            &token,
        )
        .await;

        assert_eq!(result, Err(WaitError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_predicate() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = await_condition(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    true
                }
            },
            Duration::from_millis(10),
            WaitBound::Attempts(3),
            &token,
        )
        .await;

        assert_eq!(result, Err(WaitError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
