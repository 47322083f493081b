//! Manually settled completion handle
//!
//! Used when completion is signalled by a callback on some event source
//! ("tell me when the theme has been applied") rather than by a future the
//! caller can await directly. Clones share the same slot; the first
//! `resolve`/`reject` wins and later ones are ignored.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{Rejection, ShellError};

type Settlement<T> = Option<Result<T, Rejection>>;

pub struct Deferred<T> {
    slot: Arc<watch::Sender<Settlement<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Deferred<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { slot: Arc::new(tx) }
    }

    /// Settle successfully. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with a failure. Returns false if already settled.
    ///
    /// Every waiter receives the same error, causes included.
    pub fn reject(&self, error: anyhow::Error) -> bool {
        self.settle(Err(Rejection::new(error)))
    }

    fn settle(&self, outcome: Result<T, Rejection>) -> bool {
        let mut outcome = Some(outcome);
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }

    pub fn is_settled(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Wait for settlement without a bound
    pub async fn wait(&self) -> Result<T, ShellError> {
        let mut rx = self.slot.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let settled = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ShellError::Rejected(Rejection::msg("completion handle dropped")))?;

        match &*settled {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(rejection)) => Err(ShellError::Rejected(rejection.clone())),
            None => Err(ShellError::Rejected(Rejection::msg("settled without a value"))),
        }
    }

    /// Race settlement against a timer. Each caller gets its own race.
    pub async fn with_timeout(&self, timeout: Duration) -> Result<T, ShellError> {
        if timeout.is_zero() {
            return Err(ShellError::InvalidTimeout(0));
        }
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ShellError::Timeout(timeout)),
        }
    }
}
