//! Cooperative cancellation
//!
//! An [`AbortController`] owns the right to fire; every clone of its
//! [`CancellationSignal`] observes the same flag and callback list. Firing
//! never interrupts work in flight: functions that accept a signal check it
//! before expensive steps and may await [`CancellationSignal::aborted`].

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

type AbortCallback = Box<dyn FnOnce() + Send>;

struct SignalState {
    aborted: AtomicBool,
    listeners: Mutex<Vec<AbortCallback>>,
    notify: Notify,
}

/// Observable side of a cancellation: flag, callbacks and an awaitable
#[derive(Clone)]
pub struct CancellationSignal {
    state: Arc<SignalState>,
}

impl CancellationSignal {
    fn new() -> Self {
        Self {
            state: Arc::new(SignalState {
                aborted: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
                notify: Notify::new(),
            }),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::Acquire)
    }

    /// Register a callback run once when the signal fires.
    ///
    /// If the signal already fired the callback runs immediately.
    pub fn on_abort<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut listeners = self.state.listeners.lock();
            if !self.is_aborted() {
                listeners.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Resolves once the signal has fired
    pub async fn aborted(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("aborted", &self.is_aborted())
            .field("listeners", &self.state.listeners.lock().len())
            .finish()
    }
}

/// Firing side of a cancellation
#[derive(Debug)]
pub struct AbortController {
    signal: CancellationSignal,
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            signal: CancellationSignal::new(),
        }
    }

    pub fn signal(&self) -> CancellationSignal {
        self.signal.clone()
    }

    /// Fire the signal. Callbacks run synchronously in registration order,
    /// exactly once; repeated calls do nothing.
    pub fn abort(&self) {
        let state = &self.signal.state;
        let listeners = {
            let mut guard = state.listeners.lock();
            if state.aborted.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *guard)
        };
        for callback in listeners {
            callback();
        }
        state.notify.notify_waiters();
    }
}
