//! Surface lifecycle management
//!
//! Owns the "display -> surfaces" caches. Surfaces are built concurrently for
//! every attached display, one failing display never affects its siblings,
//! and hot-plug events add or tear down the surfaces of a single display.
//!
//! Both lookup indices live behind one lock so a reader never observes a
//! surface in one index but not the other. Add and remove events for the same
//! physical display are serialized through a per-identity runner.

use futures::future::join_all;
use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{
    CompositorHandle, DisplayIdentity, GenericHandle, GenericMonitor, HybridDisplay, IdentityResolver,
    Surface, SurfaceFactory,
};
use crate::error::ShellError;
use crate::logging::{self, Measured};
use crate::sync::SerializedRunner;

/// Manager-assigned id, unique for the lifetime of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// A constructed surface together with the display it belongs to
#[derive(Clone)]
pub struct CachedSurface {
    pub id: SurfaceId,
    /// Name of the factory that built it
    pub kind: String,
    pub display: HybridDisplay,
    surface: Arc<dyn Surface>,
}

impl CachedSurface {
    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }
}

impl fmt::Debug for CachedSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedSurface")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("display", &self.display.identity().to_string())
            .finish()
    }
}

#[derive(Default)]
struct SurfaceCache {
    by_generic: HashMap<GenericHandle, Vec<CachedSurface>>,
    by_compositor: HashMap<CompositorHandle, Vec<CachedSurface>>,
}

impl SurfaceCache {
    fn insert(&mut self, cached: CachedSurface) {
        if let Some(handle) = cached.display.compositor_handle() {
            self.by_compositor.entry(handle).or_default().push(cached.clone());
        }
        self.by_generic
            .entry(cached.display.generic_handle())
            .or_default()
            .push(cached);
    }

    /// Destroy every surface cached for `handle`, then drop the entries from both indices.
    ///
    /// Identical panels can share a compositor handle, so only the removed
    /// surfaces leave that bucket.
    fn teardown(&mut self, handle: GenericHandle) -> Option<usize> {
        let entries = self.by_generic.get(&handle)?;

        for entry in entries {
            entry.surface.destroy();
        }

        let entries = self.by_generic.remove(&handle).unwrap_or_default();
        let removed: HashSet<SurfaceId> = entries.iter().map(|entry| entry.id).collect();
        let compositor_handles: HashSet<CompositorHandle> =
            entries.iter().filter_map(|entry| entry.display.compositor_handle()).collect();

        for compositor_handle in compositor_handles {
            if let Some(bucket) = self.by_compositor.get_mut(&compositor_handle) {
                bucket.retain(|entry| !removed.contains(&entry.id));
                if bucket.is_empty() {
                    self.by_compositor.remove(&compositor_handle);
                    debug!("Removed {} from compositor cache", compositor_handle);
                }
            }
        }
        debug!("Removed {} from display cache", handle);
        Some(entries.len())
    }

    /// Whether any cached surface belongs to a display with this identity
    fn holds(&self, identity: &DisplayIdentity) -> bool {
        self.by_generic
            .values()
            .flatten()
            .any(|entry| &entry.display.generic.identity() == identity)
    }
}

pub struct SurfaceManager {
    resolver: IdentityResolver,
    factories: RwLock<Vec<Arc<dyn SurfaceFactory>>>,
    cache: RwLock<SurfaceCache>,
    runners: Mutex<HashMap<DisplayIdentity, Arc<SerializedRunner>>>,
    next_id: AtomicU64,
}

impl SurfaceManager {
    pub fn new(resolver: IdentityResolver) -> Self {
        Self {
            resolver,
            factories: RwLock::new(Vec::new()),
            cache: RwLock::new(SurfaceCache::default()),
            runners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Build a surface from `factory` on every attached display.
    ///
    /// The factory is remembered so displays plugged in later get one too.
    /// Returns the surfaces that were built; failed displays are logged and skipped.
    pub async fn bootstrap_all(&self, factory: Arc<dyn SurfaceFactory>) -> Vec<CachedSurface> {
        let _measured = Measured::new("bootstrap_all");
        self.factories.write().push(factory.clone());

        let displays = self.resolver.resolve_all();
        let outcomes = join_all(displays.iter().map(|display| self.construct(factory.as_ref(), display))).await;

        let mut loaded = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(cached) => {
                    self.cache.write().insert(cached.clone());
                    loaded.push(cached);
                }
                Err(e) => logging::except("Apply surface to displays", &e),
            }
        }

        info!(
            "Built {} '{}' surface(s) across {} display(s)",
            loaded.len(),
            factory.name(),
            displays.len()
        );
        loaded
    }

    /// React to a display being plugged in.
    ///
    /// Builds one surface per registered factory. Stale entries left under the
    /// same handle are torn down first.
    pub async fn on_display_added(&self, monitor: &GenericMonitor) -> Vec<CachedSurface> {
        let runner = self.runner_for(&monitor.identity());
        let outcome = runner
            .run(move |_signal| async move {
                let _measured = Measured::new("on_display_added");
                debug!("display-added event for {} received", monitor.handle);

                if let Some(stale) = self.cache.write().teardown(monitor.handle) {
                    warn!("{} was still cached, destroyed {} stale surface(s)", monitor.handle, stale);
                }

                let display = self.resolver.resolve(monitor);
                let factories = self.factories.read().clone();
                let outcomes = join_all(factories.iter().map(|factory| self.construct(factory.as_ref(), &display))).await;

                let mut added = Vec::new();
                for outcome in outcomes {
                    match outcome {
                        Ok(cached) => {
                            self.cache.write().insert(cached.clone());
                            debug!("New {} '{}' added to {}", cached.id, cached.kind, monitor.handle);
                            added.push(cached);
                        }
                        Err(e) => logging::except("Unable to apply surface to display", &e),
                    }
                }
                Ok(added)
            })
            .await;

        outcome.unwrap_or_else(|e| {
            logging::except("display-added handler failed", &e);
            Vec::new()
        })
    }

    /// React to a display being unplugged.
    ///
    /// Returns how many surfaces were destroyed. An unknown handle is logged
    /// and treated as already consistent.
    pub async fn on_display_removed(&self, monitor: &GenericMonitor) -> usize {
        let identity = monitor.identity();
        let runner = self.runner_for(&identity);
        let outcome = runner
            .run(move |_signal| async move {
                let _measured = Measured::new("on_display_removed");
                debug!("display-removed event for {} received", monitor.handle);
                Ok(self.remove_cached(monitor.handle))
            })
            .await;
        drop(runner);
        self.release_runner(&identity);

        outcome.unwrap_or_else(|e| {
            logging::except("display-removed handler failed", &e);
            0
        })
    }

    fn remove_cached(&self, handle: GenericHandle) -> usize {
        match self.cache.write().teardown(handle) {
            Some(destroyed) => {
                debug!("All {} surface(s) destroyed from {}", destroyed, handle);
                destroyed
            }
            None => {
                error!("Could not find surfaces for {} on removal event", handle);
                0
            }
        }
    }

    /// Surfaces cached for a display-server handle
    pub fn get_surfaces_for(&self, handle: GenericHandle) -> Vec<CachedSurface> {
        self.cache.read().by_generic.get(&handle).cloned().unwrap_or_default()
    }

    /// Surfaces cached for a compositor handle
    pub fn get_surfaces_for_compositor(&self, handle: CompositorHandle) -> Vec<CachedSurface> {
        self.cache.read().by_compositor.get(&handle).cloned().unwrap_or_default()
    }

    /// Display-server handles that currently have surfaces
    pub fn displays(&self) -> Vec<GenericHandle> {
        let mut handles: Vec<_> = self.cache.read().by_generic.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn surface_count(&self) -> usize {
        self.cache.read().by_generic.values().map(Vec::len).sum()
    }

    /// Destroy every cached surface; used on shutdown
    pub fn teardown_all(&self) -> usize {
        let mut cache = self.cache.write();
        let handles: Vec<_> = cache.by_generic.keys().copied().collect();
        handles.into_iter().filter_map(|handle| cache.teardown(handle)).sum()
    }

    async fn construct(
        &self,
        factory: &dyn SurfaceFactory,
        display: &HybridDisplay,
    ) -> Result<CachedSurface, ShellError> {
        let identity = display.identity();
        match factory.create(display).await {
            Ok(Some(surface)) => Ok(CachedSurface {
                id: SurfaceId(self.next_id.fetch_add(1, Ordering::Relaxed)),
                kind: factory.name().to_string(),
                display: display.clone(),
                surface,
            }),
            Ok(None) => Err(ShellError::empty_surface(&identity)),
            Err(e) => Err(ShellError::construction_failure(&identity, e)),
        }
    }

    /// Forget the runner of an identity that has no surfaces left and no queued events.
    ///
    /// Handles are only cloned out of the map under its lock, so a count of
    /// one seen under that lock means nobody else can be using the runner.
    fn release_runner(&self, identity: &DisplayIdentity) {
        let mut runners = self.runners.lock();
        let idle = runners
            .get(identity)
            .map_or(false, |runner| Arc::strong_count(runner) == 1);
        if idle && !self.cache.read().holds(identity) {
            runners.remove(identity);
            trace!("Released runner for {}", identity);
        }
    }

    fn runner_for(&self, identity: &DisplayIdentity) -> Arc<SerializedRunner> {
        self.runners
            .lock()
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(SerializedRunner::new(format!("display {}", identity))))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{CompositorMonitor, MockCompositor, MockDisplayServer, SurfaceOutcome};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct FakeSurface {
        destroyed: AtomicBool,
    }

    impl Surface for FakeSurface {
        fn destroy(&self) {
            self.destroyed.store(true, Ordering::SeqCst);
        }
    }

    /// Fails for one model, returns nothing for another, builds otherwise
    struct FakeFactory {
        calls: AtomicUsize,
        built: Mutex<Vec<Arc<FakeSurface>>>,
    }

    impl SurfaceFactory for FakeFactory {
        fn name(&self) -> &str {
            "bar"
        }

        fn create<'a>(&'a self, display: &'a HybridDisplay) -> BoxFuture<'a, SurfaceOutcome> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                match display.generic.model.as_str() {
                    "BROKEN" => Err(anyhow::anyhow!("layer shell refused")),
                    "EMPTY" => Ok(None),
                    _ => {
                        let surface = Arc::new(FakeSurface {
                            destroyed: AtomicBool::new(false),
                        });
                        self.built.lock().push(surface.clone());
                        Ok(Some(surface as Arc<dyn Surface>))
                    }
                }
            }
            .boxed()
        }
    }

    fn monitor(handle: u64, model: &str) -> GenericMonitor {
        GenericMonitor {
            handle: GenericHandle(handle),
            connector: None,
            manufacturer: "ACME".to_string(),
            model: model.to_string(),
            width: 1920,
            height: 1080,
        }
    }

    fn compositor_for(handle: u64, m: &GenericMonitor) -> CompositorMonitor {
        CompositorMonitor {
            handle: CompositorHandle(handle),
            name: format!("DP-{}", handle),
            make: m.manufacturer.clone(),
            model: m.model.clone(),
            width: m.width,
            height: m.height,
        }
    }

    fn manager_with(monitors: Vec<GenericMonitor>) -> SurfaceManager {
        let compositor_monitors: Vec<_> = monitors
            .iter()
            .enumerate()
            .map(|(i, m)| compositor_for(100 + i as u64, m))
            .collect();

        let mut server = MockDisplayServer::new();
        server.expect_monitors().returning(move || monitors.clone());
        let mut comp = MockCompositor::new();
        comp.expect_monitors().returning(move || compositor_monitors.clone());

        SurfaceManager::new(IdentityResolver::new(Arc::new(server), Arc::new(comp)))
    }

    fn factory() -> Arc<FakeFactory> {
        Arc::new(FakeFactory {
            calls: AtomicUsize::new(0),
            built: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_bootstrap_isolates_failures() {
        let manager = manager_with(vec![
            monitor(0, "GOOD"),
            monitor(1, "BROKEN"),
            monitor(2, "EMPTY"),
            monitor(3, "FINE"),
        ]);
        let factory = factory();

        let loaded = manager.bootstrap_all(factory.clone()).await;

        assert_eq!(factory.calls.load(Ordering::SeqCst), 4);
        assert_eq!(loaded.len(), 2);
        assert_eq!(manager.surface_count(), 2);
        assert_eq!(manager.displays(), vec![GenericHandle(0), GenericHandle(3)]);
        assert!(manager.get_surfaces_for(GenericHandle(1)).is_empty());
        assert!(manager.get_surfaces_for(GenericHandle(2)).is_empty());
    }

    #[tokio::test]
    async fn test_both_indices_are_populated() {
        let manager = manager_with(vec![monitor(0, "GOOD")]);
        manager.bootstrap_all(factory()).await;

        let by_generic = manager.get_surfaces_for(GenericHandle(0));
        let by_compositor = manager.get_surfaces_for_compositor(CompositorHandle(100));
        assert_eq!(by_generic.len(), 1);
        assert_eq!(by_compositor.len(), 1);
        assert_eq!(by_generic[0].id, by_compositor[0].id);
    }

    #[tokio::test]
    async fn test_remove_destroys_then_forgets() {
        let manager = manager_with(vec![monitor(0, "GOOD")]);
        let factory = factory();
        manager.bootstrap_all(factory.clone()).await;
        assert!(!factory.built.lock()[0].destroyed.load(Ordering::SeqCst));

        let destroyed = manager.on_display_removed(&monitor(0, "GOOD")).await;

        assert_eq!(destroyed, 1);
        assert!(manager.get_surfaces_for(GenericHandle(0)).is_empty());
        assert!(manager.get_surfaces_for_compositor(CompositorHandle(100)).is_empty());
        assert!(factory.built.lock()[0].destroyed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_remove_unknown_display_is_not_fatal() {
        let manager = manager_with(vec![]);
        assert_eq!(manager.on_display_removed(&monitor(9, "GHOST")).await, 0);
    }

    #[tokio::test]
    async fn test_add_uses_every_registered_factory() {
        let manager = manager_with(vec![monitor(0, "GOOD")]);
        let bar = factory();
        let taskbar = factory();
        manager.bootstrap_all(bar.clone()).await;
        manager.bootstrap_all(taskbar.clone()).await;
        assert_eq!(manager.get_surfaces_for(GenericHandle(0)).len(), 2);

        let added = manager.on_display_added(&monitor(5, "NEW")).await;
        assert_eq!(added.len(), 2);
        assert_eq!(bar.calls.load(Ordering::SeqCst), 2);
        assert_eq!(taskbar.calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.surface_count(), 4);
    }

    #[tokio::test]
    async fn test_removing_one_of_two_identical_panels_keeps_the_other_indexed() {
        // No connector, so both twins pair with the first compositor match.
        let manager = manager_with(vec![monitor(0, "TWIN"), monitor(1, "TWIN")]);
        let factory = factory();
        manager.bootstrap_all(factory.clone()).await;
        assert_eq!(manager.get_surfaces_for_compositor(CompositorHandle(100)).len(), 2);

        assert_eq!(manager.on_display_removed(&monitor(0, "TWIN")).await, 1);

        let survivor = manager.get_surfaces_for(GenericHandle(1));
        assert_eq!(survivor.len(), 1);
        assert_eq!(survivor[0].display.compositor_handle(), Some(CompositorHandle(100)));
        let by_compositor = manager.get_surfaces_for_compositor(CompositorHandle(100));
        assert_eq!(by_compositor.len(), 1);
        assert_eq!(by_compositor[0].id, survivor[0].id);

        assert_eq!(manager.on_display_removed(&monitor(1, "TWIN")).await, 1);
        assert!(manager.get_surfaces_for_compositor(CompositorHandle(100)).is_empty());
        assert!(factory.built.lock().iter().all(|s| s.destroyed.load(Ordering::SeqCst)));
    }

    #[tokio::test]
    async fn test_stale_add_keeps_twin_indexed() {
        let manager = manager_with(vec![monitor(0, "TWIN"), monitor(1, "TWIN")]);
        manager.bootstrap_all(factory()).await;

        // A repeated add for display 0 replaces only its own surface.
        let added = manager.on_display_added(&monitor(0, "TWIN")).await;
        assert_eq!(added.len(), 1);

        let by_compositor: Vec<_> = manager
            .get_surfaces_for_compositor(CompositorHandle(100))
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(by_compositor.len(), 2);
        assert!(by_compositor.contains(&manager.get_surfaces_for(GenericHandle(1))[0].id));
        assert!(by_compositor.contains(&added[0].id));
    }

    #[tokio::test]
    async fn test_runner_released_once_identity_is_gone() {
        let manager = manager_with(vec![monitor(0, "TWIN"), monitor(1, "TWIN"), monitor(2, "GOOD")]);
        manager.bootstrap_all(factory()).await;

        manager.on_display_removed(&monitor(2, "GOOD")).await;
        assert!(manager.runners.lock().is_empty());

        // The twin still holds a surface under the same identity.
        manager.on_display_removed(&monitor(0, "TWIN")).await;
        assert_eq!(manager.runners.lock().len(), 1);

        manager.on_display_removed(&monitor(1, "TWIN")).await;
        assert!(manager.runners.lock().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_all_empties_cache() {
        let manager = manager_with(vec![monitor(0, "GOOD"), monitor(1, "FINE")]);
        manager.bootstrap_all(factory()).await;

        assert_eq!(manager.teardown_all(), 2);
        assert_eq!(manager.surface_count(), 0);
        assert!(manager.displays().is_empty());
    }
}
