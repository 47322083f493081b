// Surface lifecycle integration tests for Baar
//
// Drives the surface manager through the headless backend the way the shell
// does: bootstrap, hot-plug add/remove, lookups and teardown.

use baar::config::OutputConfig;
use baar::display::{
    CompositorHandle, DisplayServer, GenericHandle, HybridDisplay, Surface, SurfaceFactory, SurfaceOutcome,
    TopologyEvent,
};
use baar::headless::{LoggingSurfaceFactory, StaticTopology};
use baar::{IdentityResolver, SurfaceManager};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

fn output(connector: &str, model: &str) -> OutputConfig {
    OutputConfig {
        connector: connector.to_string(),
        make: "ACME".to_string(),
        model: model.to_string(),
        width: 2560,
        height: 1440,
        compositor: true,
    }
}

fn manager_over(topology: &Arc<StaticTopology>) -> SurfaceManager {
    SurfaceManager::new(IdentityResolver::new(topology.clone(), topology.clone()))
}

/// Refuses every display whose model starts with "X"
struct PickyFactory;

impl SurfaceFactory for PickyFactory {
    fn name(&self) -> &str {
        "picky"
    }

    fn create<'a>(&'a self, display: &'a HybridDisplay) -> BoxFuture<'a, SurfaceOutcome> {
        async move {
            if display.generic.model.starts_with('X') {
                anyhow::bail!("no layer shell for {}", display);
            }
            let inner = LoggingSurfaceFactory::new("picky");
            inner.create(display).await
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_bootstrap_count_matches_successful_displays() {
    let topology = Arc::new(StaticTopology::new(&[
        output("DP-1", "A"),
        output("DP-2", "X1"),
        output("DP-3", "B"),
        output("DP-4", "X2"),
    ]));
    let manager = manager_over(&topology);

    let loaded = manager.bootstrap_all(Arc::new(PickyFactory)).await;

    assert_eq!(loaded.len(), 2);
    assert_eq!(manager.displays().len(), 2);
    for cached in &loaded {
        assert!(!cached.display.generic.model.starts_with('X'));
    }
}

#[tokio::test]
async fn test_remove_then_add_builds_a_fresh_surface() {
    let topology = Arc::new(StaticTopology::new(&[output("DP-1", "A")]));
    let manager = manager_over(&topology);
    let factory = Arc::new(LoggingSurfaceFactory::new("bar"));
    manager.bootstrap_all(factory.clone()).await;

    let original = manager.get_surfaces_for(GenericHandle(1));
    assert_eq!(original.len(), 1);

    let monitor = topology.monitors().remove(0);
    assert_eq!(manager.on_display_removed(&monitor).await, 1);
    assert!(factory.built()[0].is_destroyed());
    assert!(manager.get_surfaces_for(GenericHandle(1)).is_empty());

    let added = manager.on_display_added(&monitor).await;
    assert_eq!(added.len(), 1);
    assert_ne!(added[0].id, original[0].id);
    assert!(!factory.built()[1].is_destroyed());
}

#[tokio::test]
async fn test_lookups_are_idempotent() {
    let topology = Arc::new(StaticTopology::new(&[output("DP-1", "A"), output("DP-2", "B")]));
    let manager = manager_over(&topology);
    manager.bootstrap_all(Arc::new(LoggingSurfaceFactory::new("bar"))).await;

    let first: Vec<_> = manager.get_surfaces_for(GenericHandle(2)).iter().map(|c| c.id).collect();
    let second: Vec<_> = manager.get_surfaces_for(GenericHandle(2)).iter().map(|c| c.id).collect();
    assert_eq!(first, second);

    let via_compositor: Vec<_> = manager
        .get_surfaces_for_compositor(CompositorHandle(2))
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(first, via_compositor);
}

#[tokio::test]
async fn test_unknown_removal_is_harmless() {
    let topology = Arc::new(StaticTopology::new(&[output("DP-1", "A")]));
    let manager = manager_over(&topology);
    let factory = Arc::new(LoggingSurfaceFactory::new("bar"));
    manager.bootstrap_all(factory.clone()).await;

    let mut ghost = topology.monitors().remove(0);
    ghost.handle = GenericHandle(99);

    assert_eq!(manager.on_display_removed(&ghost).await, 0);
    assert_eq!(manager.surface_count(), 1);
    assert!(!factory.built()[0].is_destroyed());
}

#[tokio::test]
async fn test_display_without_compositor_counterpart_still_gets_a_bar() {
    let mut unmanaged = output("HDMI-A-1", "A");
    unmanaged.compositor = false;
    let topology = Arc::new(StaticTopology::new(&[unmanaged]));
    let manager = manager_over(&topology);

    let loaded = manager.bootstrap_all(Arc::new(LoggingSurfaceFactory::new("bar"))).await;

    assert_eq!(loaded.len(), 1);
    assert!(!loaded[0].display.is_managed());
    assert!(loaded[0].display.compositor_handle().is_none());
}

#[tokio::test]
async fn test_topology_replacement_drives_hotplug() {
    let topology = Arc::new(StaticTopology::new(&[output("DP-1", "A"), output("DP-2", "B")]));
    let manager = manager_over(&topology);
    let factory = Arc::new(LoggingSurfaceFactory::new("bar"));
    manager.bootstrap_all(factory.clone()).await;

    let events = topology.replace(&[output("DP-2", "B"), output("DP-3", "C")]);
    for event in &events {
        match event {
            TopologyEvent::Added(monitor) => {
                manager.on_display_added(monitor).await;
            }
            TopologyEvent::Removed(monitor) => {
                manager.on_display_removed(monitor).await;
            }
        }
    }

    assert_eq!(manager.displays(), vec![GenericHandle(2), GenericHandle(3)]);
    assert_eq!(factory.built().iter().filter(|s| s.is_destroyed()).count(), 1);

    assert_eq!(manager.teardown_all(), 2);
    assert!(factory.built().iter().all(|s| s.is_destroyed()));
}

#[test]
fn test_identity_is_stable_across_enumerations() {
    let topology = StaticTopology::new(&[output("DP-1", "A"), output("DP-2", "A")]);
    let resolver = IdentityResolver::new(Arc::new(topology), Arc::new(StaticTopology::new(&[])));

    let first: Vec<_> = resolver.resolve_all().iter().map(|d| d.identity()).collect();
    let second: Vec<_> = resolver.resolve_all().iter().map(|d| d.identity()).collect();

    assert_eq!(first, second);
    // Identical panels share an identity
    assert_eq!(first[0], first[1]);
}
