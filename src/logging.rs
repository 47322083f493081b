//! Logging setup and diagnostics
//!
//! Thin layer over the `log` facade:
//!
//! - **Initialization**: `env_logger` with a default filter that `RUST_LOG`
//!   can override
//! - **Diagnostics**: `except` logs an error together with its nested causes
//! - **Measurement**: `Stopwatch` reports elapsed time for handlers and reloads
//!
//! # Usage
//!
//! ```no_run
//! use baar::logging::{self, LogLevel, Stopwatch};
//!
//! logging::init(LogLevel::Info);
//!
//! let watch = Stopwatch::start("bootstrap");
//! // ... do work ...
//! watch.log_elapsed();
//! ```

use log::{debug, log, Level};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::time::{Duration, Instant};

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    #[default]
    Info,
    /// Warning level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Convert to the filter string understood by `env_logger`
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initialize the global logger. Calling it again is harmless.
pub fn init(level: LogLevel) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .format_timestamp_millis()
        .try_init();
}

/// Log `context` at error level followed by every cause in `err`'s source chain
pub fn except(context: &str, err: &(dyn StdError + 'static)) {
    except_at(Level::Error, context, err);
}

/// Same as [`except`] but at a caller-chosen level
pub fn except_at(level: Level, context: &str, err: &(dyn StdError + 'static)) {
    for line in cause_lines(context, err) {
        log!(level, "{}", line);
    }
}

/// Render `context` and the nested cause chain, one indented line per cause
pub fn cause_lines(context: &str, err: &(dyn StdError + 'static)) -> Vec<String> {
    let mut lines = vec![format!("{}: {}", context, err)];
    let mut depth = 1;
    let mut cause = err.source();
    while let Some(inner) = cause {
        lines.push(format!("{}↪ caused by: {}", "  ".repeat(depth), inner));
        depth += 1;
        cause = inner.source();
    }
    lines
}

/// Elapsed-time reporter for handlers and reloads
#[derive(Debug)]
pub struct Stopwatch {
    label: &'static str,
    started: Instant,
}

impl Stopwatch {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Format elapsed time in microseconds
    pub fn fmt_elapsed(&self) -> String {
        format!("{}µs", self.elapsed().as_micros())
    }

    pub fn log_elapsed(&self) {
        debug!("⏱️  {} elapsed {}", self.label, self.fmt_elapsed());
    }
}

/// Logs on drop so every exit path of a handler is measured
pub struct Measured(Stopwatch);

impl Measured {
    pub fn new(label: &'static str) -> Self {
        Self(Stopwatch::start(label))
    }
}

impl Drop for Measured {
    fn drop(&mut self) {
        self.0.log_elapsed();
    }
}
