//! Combinators on the native `Result` and `Option`
//!
//! Success/failure and presence/absence are plain `Result` and `Option`.
//! These extension traits add the few operations the shell needs on top:
//! logging a failure without changing control flow, logging on absence,
//! and an unwrap that reports the full cause chain before panicking.

use log::{warn, Level};
use std::error::Error as StdError;

use crate::logging;

/// Extensions for fallible values
pub trait OutcomeExt<T, E> {
    /// Log the failure (with causes) at warn level and hand the result back unchanged
    fn inspect_failure(self, context: &str) -> Self;

    /// Unwrap, logging the failure and its causes before panicking.
    ///
    /// Reserved for states that indicate a programming error.
    fn unwrap_or_diagnose(self, context: &str) -> T;
}

impl<T, E> OutcomeExt<T, E> for Result<T, E>
where
    E: StdError + 'static,
{
    fn inspect_failure(self, context: &str) -> Self {
        if let Err(e) = &self {
            logging::except_at(Level::Warn, context, e);
        }
        self
    }

    #[track_caller]
    fn unwrap_or_diagnose(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                logging::except(context, &e);
                panic!("{}: {}", context, e);
            }
        }
    }
}

/// `anyhow::Error` is not `std::error::Error`, so it gets its own impl
pub trait AnyhowOutcomeExt<T> {
    fn inspect_failure(self, context: &str) -> Self;
    fn unwrap_or_diagnose(self, context: &str) -> T;
}

impl<T> AnyhowOutcomeExt<T> for anyhow::Result<T> {
    fn inspect_failure(self, context: &str) -> Self {
        if let Err(e) = &self {
            logging::except_at(Level::Warn, context, e.as_ref());
        }
        self
    }

    #[track_caller]
    fn unwrap_or_diagnose(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                logging::except(context, e.as_ref());
                panic!("{}: {:#}", context, e);
            }
        }
    }
}

/// Extensions for optional values
pub trait PresenceExt<T> {
    /// Run `side_effect` when the value is absent, returning the option unchanged
    fn on_absent<F: FnOnce()>(self, side_effect: F) -> Self;

    /// Warn with `message` when the value is absent
    fn warn_absent(self, message: &str) -> Self;
}

impl<T> PresenceExt<T> for Option<T> {
    fn on_absent<F: FnOnce()>(self, side_effect: F) -> Self {
        if self.is_none() {
            side_effect();
        }
        self
    }

    fn warn_absent(self, message: &str) -> Self {
        self.on_absent(|| warn!("{}", message))
    }
}
