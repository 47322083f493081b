//! Display topology and per-display surfaces
//!
//! Two collaborators enumerate the same physical displays independently:
//! the display server (generic, windowing-system view) and the compositor
//! (carrying compositor-specific capabilities). This module defines their
//! boundary, the identity used to correlate them, and the manager that keeps
//! one set of surfaces per attached display.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

pub mod identity;
pub mod manager;

pub use identity::{DisplayIdentity, HybridDisplay, IdentityResolver};
pub use manager::{CachedSurface, SurfaceId, SurfaceManager};

/// Display-server handle for one attached display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenericHandle(pub u64);

/// Compositor handle for one attached display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositorHandle(pub u64);

impl fmt::Display for GenericHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "display#{}", self.0)
    }
}

impl fmt::Display for CompositorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor#{}", self.0)
    }
}

/// A display as the display server reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericMonitor {
    pub handle: GenericHandle,
    /// Output/connector name when the display server exposes one ("DP-1")
    pub connector: Option<String>,
    pub manufacturer: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
}

impl GenericMonitor {
    pub fn identity(&self) -> DisplayIdentity {
        DisplayIdentity::new(&self.manufacturer, &self.model, self.width, self.height)
    }
}

/// A display as the compositor reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositorMonitor {
    pub handle: CompositorHandle,
    /// Compositor output name ("DP-1")
    pub name: String,
    pub make: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
}

impl CompositorMonitor {
    pub fn identity(&self) -> DisplayIdentity {
        DisplayIdentity::new(&self.make, &self.model, self.width, self.height)
    }
}

/// Topology change delivered by the event source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    Added(GenericMonitor),
    Removed(GenericMonitor),
}

/// Display-server enumeration. Polled, in display-server order.
#[cfg_attr(test, mockall::automock)]
pub trait DisplayServer: Send + Sync {
    fn monitors(&self) -> Vec<GenericMonitor>;
}

/// Compositor monitor list. Polled, in compositor order.
#[cfg_attr(test, mockall::automock)]
pub trait Compositor: Send + Sync {
    fn monitors(&self) -> Vec<CompositorMonitor>;
}

/// A rendered UI element anchored to one display.
///
/// Teardown is explicit; dropping the last handle does not destroy it.
pub trait Surface: Send + Sync {
    fn destroy(&self);
}

/// Result of one factory call: `None` means the factory chose not to build
pub type SurfaceOutcome = anyhow::Result<Option<Arc<dyn Surface>>>;

/// Builds one kind of surface (bar, taskbar, ...) for a display
pub trait SurfaceFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create<'a>(&'a self, display: &'a HybridDisplay) -> BoxFuture<'a, SurfaceOutcome>;
}
