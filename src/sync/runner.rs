//! Serialized task runner
//!
//! One runner guards one reloadable resource. Submitted operations run one at
//! a time in submission order; a failed or timed-out operation releases its
//! turn like a successful one, so the queue never wedges.

use log::trace;
use std::future::Future;
use std::time::Duration;

use super::signal::{AbortController, CancellationSignal};
use super::timeout::{run_with_signal, with_timeout};
use crate::error::{timeout_from_millis, ShellError};

#[derive(Debug)]
pub struct SerializedRunner {
    name: String,
    // tokio's mutex hands out the lock in FIFO order
    turn: tokio::sync::Mutex<()>,
    timeout_ms: Option<i64>,
}

impl SerializedRunner {
    /// Runner without a time bound
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            turn: tokio::sync::Mutex::new(()),
            timeout_ms: None,
        }
    }

    /// Runner whose operations fail with `Timeout` after `timeout_ms`.
    ///
    /// A bound of zero or below makes every `run` fail with `InvalidTimeout`.
    pub fn with_timeout_ms(name: impl Into<String>, timeout_ms: i64) -> Self {
        Self {
            timeout_ms: Some(timeout_ms),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.and_then(|ms| timeout_from_millis(ms).ok())
    }

    /// Queue `f` behind every previously submitted operation and return its outcome
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T, ShellError>
    where
        F: FnOnce(CancellationSignal) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let timeout = self.timeout_ms.map(timeout_from_millis).transpose()?;

        let _turn = self.turn.lock().await;
        trace!("[{}] running queued operation", self.name);

        match timeout {
            Some(timeout) => with_timeout(timeout, f).await,
            None => run_with_signal(AbortController::new().signal(), f).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::time::{advance, sleep, Instant};
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test(start_paused = true)]
    async fn test_second_operation_waits_for_first() {
        let runner = SerializedRunner::new("theme");
        let events = Arc::new(Mutex::new(Vec::new()));

        let slow_events = events.clone();
        let mut slow = task::spawn(runner.run(move |_| async move {
            slow_events.lock().push("slow start");
            sleep(Duration::from_millis(50)).await;
            slow_events.lock().push("slow end");
            Ok(())
        }));

        let fast_events = events.clone();
        let mut fast = task::spawn(runner.run(move |_| async move {
            fast_events.lock().push("fast start");
            Ok(())
        }));

        assert_pending!(slow.poll());
        assert_pending!(fast.poll());
        assert_eq!(*events.lock(), vec!["slow start"]);

        advance(Duration::from_millis(50)).await;
        assert_ready!(slow.poll()).unwrap();
        assert!(fast.is_woken());
        assert_ready!(fast.poll()).unwrap();

        assert_eq!(*events.lock(), vec!["slow start", "slow end", "fast start"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_never_overlap_under_join() {
        let runner = SerializedRunner::new("config");
        let start = Instant::now();

        let (a, b) = tokio::join!(
            runner.run(|_| async {
                sleep(Duration::from_millis(200)).await;
                Ok(Instant::now())
            }),
            runner.run(|_| async { Ok(Instant::now()) }),
        );

        let slow_end = a.unwrap();
        let fast_start = b.unwrap();
        assert!(fast_start >= slow_end);
        assert!(slow_end - start >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_failure_does_not_block_queue() {
        let runner = SerializedRunner::new("symbols");

        let first: Result<(), _> = runner
            .run(|_| async { Err(anyhow::anyhow!("unreadable file")) })
            .await;
        assert!(matches!(first, Err(ShellError::Task(_))));

        let second = runner.run(|_| async { Ok("loaded") }).await;
        assert_eq!(second.unwrap(), "loaded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_the_queue() {
        let runner = SerializedRunner::with_timeout_ms("replacer", 100);
        assert_eq!(runner.timeout(), Some(Duration::from_millis(100)));

        let (hung, next) = tokio::join!(
            runner.run(|_| async {
                sleep(Duration::from_secs(60)).await;
                Ok(())
            }),
            runner.run(|_| async { Ok(7) }),
        );

        assert!(hung.unwrap_err().is_timeout());
        assert_eq!(next.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_invalid_timeout_is_rejected_before_queueing() {
        let runner = SerializedRunner::with_timeout_ms("broken", -1);
        assert_eq!(runner.timeout(), None);

        // Hold the turn; a queued call would hang here.
        let _held = runner.turn.lock().await;
        let result = runner.run(|_| async { Ok(()) }).await;
        assert!(matches!(result, Err(ShellError::InvalidTimeout(-1))));
    }
}
