//! Display identity and the resolver pairing both enumerations
//!
//! The identity of a display is derived from its content, not its position in
//! either list: `(manufacturer, model, width, height)`. Two physically
//! identical panels share an identity; when several compositor monitors match,
//! the connector name breaks the tie if the display server reports one,
//! otherwise the first match in compositor order wins.

use log::{debug, warn, Level};
use std::fmt;
use std::sync::Arc;

use super::{Compositor, CompositorHandle, CompositorMonitor, DisplayServer, GenericHandle, GenericMonitor};
use crate::error::ShellError;
use crate::logging;
use crate::outcome::PresenceExt;

/// Content-addressed key for a physical display
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayIdentity {
    manufacturer: String,
    model: String,
    width: u32,
    height: u32,
}

impl DisplayIdentity {
    pub fn new(manufacturer: &str, model: &str, width: u32, height: u32) -> Self {
        Self {
            manufacturer: manufacturer.to_string(),
            model: model.to_string(),
            width,
            height,
        }
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for DisplayIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}.{}", self.manufacturer, self.model, self.width, self.height)
    }
}

/// One physical display seen through both enumerations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridDisplay {
    pub generic: GenericMonitor,
    /// Absent when the compositor lists no matching monitor
    pub compositor: Option<CompositorMonitor>,
}

impl HybridDisplay {
    /// Compositor-derived identity when paired, display-server-derived otherwise
    pub fn identity(&self) -> DisplayIdentity {
        match &self.compositor {
            Some(monitor) => monitor.identity(),
            None => self.generic.identity(),
        }
    }

    pub fn generic_handle(&self) -> GenericHandle {
        self.generic.handle
    }

    pub fn compositor_handle(&self) -> Option<CompositorHandle> {
        self.compositor.as_ref().map(|m| m.handle)
    }

    pub fn is_managed(&self) -> bool {
        self.compositor.is_some()
    }
}

impl fmt::Display for HybridDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.compositor {
            Some(monitor) => write!(f, "{} ({} / {})", self.identity(), self.generic.handle, monitor.name),
            None => write!(f, "{} ({} / unmanaged)", self.identity(), self.generic.handle),
        }
    }
}

/// Pair one display-server monitor with its compositor counterpart
pub fn pair(generic: &GenericMonitor, compositor_monitors: &[CompositorMonitor]) -> HybridDisplay {
    let identity = generic.identity();
    let matches: Vec<&CompositorMonitor> = compositor_monitors
        .iter()
        .filter(|m| m.identity() == identity)
        .collect();

    let chosen = match matches.as_slice() {
        [] => None,
        [only] => Some(*only),
        [first, ..] => {
            let by_connector = generic
                .connector
                .as_deref()
                .and_then(|connector| matches.iter().copied().find(|m| m.name == connector));

            match by_connector {
                Some(monitor) => {
                    debug!("{} matches {} compositor monitors, picked {} by connector", identity, matches.len(), monitor.name);
                    Some(monitor)
                }
                None => {
                    warn!(
                        "{} matches {} compositor monitors, using first match {}",
                        identity,
                        matches.len(),
                        first.name
                    );
                    Some(*first)
                }
            }
        }
    };

    let compositor = chosen.cloned().on_absent(|| {
        logging::except_at(Level::Warn, "Unmanaged display", &ShellError::identity_mismatch(&identity))
    });

    HybridDisplay {
        generic: generic.clone(),
        compositor,
    }
}

/// Produces paired displays from the current topology. Nothing is cached
/// between calls so hot-plug handlers always see what is attached now.
#[derive(Clone)]
pub struct IdentityResolver {
    display_server: Arc<dyn DisplayServer>,
    compositor: Arc<dyn Compositor>,
}

impl IdentityResolver {
    pub fn new(display_server: Arc<dyn DisplayServer>, compositor: Arc<dyn Compositor>) -> Self {
        Self {
            display_server,
            compositor,
        }
    }

    /// Pair every attached display, in display-server order
    pub fn resolve_all(&self) -> Vec<HybridDisplay> {
        let compositor_monitors = self.compositor.monitors();
        self.display_server
            .monitors()
            .iter()
            .map(|generic| pair(generic, &compositor_monitors))
            .collect()
    }

    /// Pair a single display, e.g. one reported by an add event
    pub fn resolve(&self, generic: &GenericMonitor) -> HybridDisplay {
        pair(generic, &self.compositor.monitors())
    }
}
