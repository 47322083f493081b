//! # Baar Status Bar Shell Library
//!
//! Core of a desktop status-bar shell: keeps one set of UI surfaces per
//! attached display, survives hot-plug, and reloads configuration and theme
//! without ever running two reloads of the same resource at once.
//!
//! ## Architecture
//!
//! Baar is built on a modular architecture:
//! - `sync`: serialized runner, cancellation signal, timeout, deferred completion
//! - `display`: display identity resolution and the surface lifecycle manager
//! - `config`: configuration parsing and the serialized reloadable loader
//! - `theme`: stylesheet rebuilds with load notifications
//! - `watch`: polling file watcher that triggers reloads
//! - `headless`: display backend served from the configured outputs
//! - `shell`: orchestration, signal handling and teardown
//!
//! ## Usage
//!
//! ```rust,no_run
//! use baar::{BaarConfig, BaarShell};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BaarConfig::default();
//!     let shell = BaarShell::new("~/.config/baar/baar.toml", config)?;
//!     shell.run().await
//! }
//! ```

pub mod config;
pub mod display;
pub mod error;
pub mod headless;
pub mod logging;
pub mod outcome;
pub mod shell;
pub mod sync;
pub mod theme;
pub mod watch;

// Re-export main types for easy access
pub use config::BaarConfig;
pub use display::{DisplayIdentity, HybridDisplay, IdentityResolver, SurfaceManager};
pub use error::ShellError;
pub use shell::BaarShell;
pub use sync::{Deferred, SerializedRunner};

/// Version information for Baar
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
