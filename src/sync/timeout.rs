//! Time-bounded execution of async work
//!
//! The work receives a fresh [`CancellationSignal`]. When the bound elapses
//! first the signal fires, the caller gets `ShellError::Timeout`, and the work
//! future is dropped at its current suspension point. Side effects it already
//! performed are not rolled back.

use log::debug;
use std::future::Future;
use std::time::Duration;

use super::signal::{AbortController, CancellationSignal};
use crate::error::ShellError;

/// Run `f` unless `signal` has already fired
pub async fn run_with_signal<F, Fut, T>(signal: CancellationSignal, f: F) -> Result<T, ShellError>
where
    F: FnOnce(CancellationSignal) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    if signal.is_aborted() {
        return Err(ShellError::Aborted);
    }
    f(signal).await.map_err(ShellError::from)
}

/// Race `f` against a timer of `timeout`.
///
/// Returns `InvalidTimeout` without running `f` for a zero duration.
/// The timer is dropped as soon as either side settles.
pub async fn with_timeout<F, Fut, T>(timeout: Duration, f: F) -> Result<T, ShellError>
where
    F: FnOnce(CancellationSignal) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    if timeout.is_zero() {
        return Err(ShellError::InvalidTimeout(0));
    }

    let controller = AbortController::new();
    let work = run_with_signal(controller.signal(), f);
    tokio::pin!(work);

    let timer = tokio::time::sleep(timeout);
    tokio::pin!(timer);

    tokio::select! {
        biased;
        result = &mut work => result,
        _ = &mut timer => {
            debug!("Timed out after {:?}, aborting by signal", timeout);
            controller.abort();
            Err(ShellError::Timeout(timeout))
        }
    }
}
