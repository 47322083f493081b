//! Coordination primitives for overlapping async work
//!
//! - `signal`: cooperative cancellation
//! - `timeout`: time-bounded execution built on the signal
//! - `runner`: at-most-one-in-flight execution per resource
//! - `deferred`: completion driven by an external callback

pub mod deferred;
pub mod runner;
pub mod signal;
pub mod timeout;

pub use deferred::Deferred;
pub use runner::SerializedRunner;
pub use signal::{AbortController, CancellationSignal};
pub use timeout::{run_with_signal, with_timeout};
