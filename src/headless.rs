//! Headless display backend
//!
//! Serves both enumerations from the configured `[[outputs]]` so the shell
//! runs without a real display server. Reloading the config replaces the
//! topology and yields the add/remove events a hot-plug would have produced.

use futures::future::BoxFuture;
use futures::FutureExt;
use log::info;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::OutputConfig;
use crate::display::{
    Compositor, CompositorHandle, CompositorMonitor, DisplayServer, GenericHandle, GenericMonitor, HybridDisplay,
    Surface, SurfaceFactory, SurfaceOutcome, TopologyEvent,
};

#[derive(Default)]
struct TopologyState {
    outputs: Vec<OutputConfig>,
    handles: HashMap<String, u64>,
    next_handle: u64,
}

impl TopologyState {
    fn handle_for(&mut self, connector: &str) -> u64 {
        if let Some(handle) = self.handles.get(connector) {
            return *handle;
        }
        self.next_handle += 1;
        self.handles.insert(connector.to_string(), self.next_handle);
        self.next_handle
    }

    fn generic_monitors(&self) -> Vec<GenericMonitor> {
        self.outputs
            .iter()
            .filter_map(|output| {
                let handle = *self.handles.get(&output.connector)?;
                Some(GenericMonitor {
                    handle: GenericHandle(handle),
                    connector: Some(output.connector.clone()),
                    manufacturer: output.make.clone(),
                    model: output.model.clone(),
                    width: output.width,
                    height: output.height,
                })
            })
            .collect()
    }
}

/// Display topology described by configuration
pub struct StaticTopology {
    state: RwLock<TopologyState>,
}

impl StaticTopology {
    pub fn new(outputs: &[OutputConfig]) -> Self {
        let topology = Self {
            state: RwLock::new(TopologyState::default()),
        };
        topology.replace(outputs);
        topology
    }

    /// Swap in a new output list and return the resulting hot-plug events.
    ///
    /// An output whose mode or model changed is reported as removed and re-added.
    pub fn replace(&self, outputs: &[OutputConfig]) -> Vec<TopologyEvent> {
        let mut state = self.state.write();
        let old = state.generic_monitors();

        // Connectors that vanished or changed get a fresh handle next time.
        state.handles.retain(|connector, _| {
            outputs.iter().any(|o| &o.connector == connector)
        });
        for prior in &old {
            let changed = outputs.iter().any(|o| {
                Some(&o.connector) == prior.connector.as_ref()
                    && (o.make != prior.manufacturer
                        || o.model != prior.model
                        || o.width != prior.width
                        || o.height != prior.height)
            });
            if changed {
                if let Some(connector) = &prior.connector {
                    state.handles.remove(connector);
                }
            }
        }

        for output in outputs {
            state.handle_for(&output.connector);
        }
        state.outputs = outputs.to_vec();

        diff(&old, &state.generic_monitors())
    }
}

impl DisplayServer for StaticTopology {
    fn monitors(&self) -> Vec<GenericMonitor> {
        self.state.read().generic_monitors()
    }
}

impl Compositor for StaticTopology {
    /// Compositor order is reversed relative to the display server on purpose
    fn monitors(&self) -> Vec<CompositorMonitor> {
        let state = self.state.read();
        state
            .outputs
            .iter()
            .rev()
            .filter(|output| output.compositor)
            .filter_map(|output| {
                let handle = *state.handles.get(&output.connector)?;
                Some(CompositorMonitor {
                    handle: CompositorHandle(handle),
                    name: output.connector.clone(),
                    make: output.make.clone(),
                    model: output.model.clone(),
                    width: output.width,
                    height: output.height,
                })
            })
            .collect()
    }
}

/// Removal events for handles that disappeared, then add events for new ones
pub fn diff(old: &[GenericMonitor], new: &[GenericMonitor]) -> Vec<TopologyEvent> {
    let removed = old
        .iter()
        .filter(|o| !new.iter().any(|n| n.handle == o.handle))
        .cloned()
        .map(TopologyEvent::Removed);
    let added = new
        .iter()
        .filter(|n| !old.iter().any(|o| o.handle == n.handle))
        .cloned()
        .map(TopologyEvent::Added);
    removed.chain(added).collect()
}

/// Surface that only logs its lifecycle
pub struct LoggingSurface {
    label: String,
    destroyed: AtomicBool,
}

impl LoggingSurface {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Surface for LoggingSurface {
    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            info!("🗑️ Destroyed {}", self.label);
        }
    }
}

/// Factory producing [`LoggingSurface`]s; remembers what it built
pub struct LoggingSurfaceFactory {
    kind: String,
    built: Mutex<Vec<Arc<LoggingSurface>>>,
}

impl LoggingSurfaceFactory {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            built: Mutex::new(Vec::new()),
        }
    }

    /// Every surface built so far, destroyed ones included
    pub fn built(&self) -> Vec<Arc<LoggingSurface>> {
        self.built.lock().clone()
    }
}

impl SurfaceFactory for LoggingSurfaceFactory {
    fn name(&self) -> &str {
        &self.kind
    }

    fn create<'a>(&'a self, display: &'a HybridDisplay) -> BoxFuture<'a, SurfaceOutcome> {
        async move {
            let surface = Arc::new(LoggingSurface {
                label: format!("{} on {}", self.kind, display),
                destroyed: AtomicBool::new(false),
            });
            info!("🖼️ Created {}", surface.label);
            self.built.lock().push(surface.clone());
            Ok(Some(surface as Arc<dyn Surface>))
        }
        .boxed()
    }
}
