//! Shell orchestration
//!
//! `BaarShell` owns every subsystem and wires them together: the reloadable
//! configuration, the theme, the display topology and the surface manager.
//! It reacts to SIGHUP and to file changes by reloading, and tears all
//! surfaces down on SIGINT/SIGTERM.

use anyhow::Result;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{expand_home, BaarConfig, LockedLoader};
use crate::display::{CachedSurface, Compositor, DisplayServer, IdentityResolver, SurfaceManager, TopologyEvent};
use crate::error::ShellError;
use crate::headless::{LoggingSurfaceFactory, StaticTopology};
use crate::sync::{AbortController, SerializedRunner};
use crate::theme::{CombineCompiler, ThemeManager};
use crate::watch::FileWatcher;

/// Runner bounded by `timeout_ms`, or unbounded when it is zero
fn reload_runner(name: &str, timeout_ms: i64) -> SerializedRunner {
    if timeout_ms > 0 {
        SerializedRunner::with_timeout_ms(name, timeout_ms)
    } else {
        SerializedRunner::new(name)
    }
}

/// Main shell struct that orchestrates all subsystems
pub struct BaarShell {
    config_path: PathBuf,
    config: LockedLoader<BaarConfig>,
    theme: ThemeManager,
    theme_sources: Vec<PathBuf>,
    topology: Arc<StaticTopology>,
    surfaces: SurfaceManager,
    factory: Arc<LoggingSurfaceFactory>,
    stop: AbortController,
}

impl BaarShell {
    /// Build every subsystem from `config`, which was read from `config_path`.
    ///
    /// Later reloads read `config_path` again; `config` stays in place until
    /// one of them succeeds.
    pub fn new(config_path: impl AsRef<Path>, config: BaarConfig) -> Result<Self> {
        info!("🏗️ Initializing Baar shell...");
        let config_path = expand_home(config_path)?;
        let timeout_ms = config.general.reload_timeout_ms;

        debug!("📄 Initializing config loader...");
        let loader = LockedLoader::from_file(&config_path, reload_runner("config", timeout_ms), BaarConfig::parse);

        debug!("🎨 Initializing theme...");
        let theme_sources = config
            .theme
            .stylesheets
            .iter()
            .map(expand_home)
            .collect::<Result<Vec<_>>>()?;
        let compiler = CombineCompiler::new(theme_sources.clone(), expand_home(&config.theme.output)?);
        let theme = ThemeManager::new(Arc::new(compiler), reload_runner("theme", timeout_ms));

        // The stylesheet list is fixed at startup; reloads only pick up new contents.
        let startup_sources = config.theme.stylesheets.clone();
        loader.on_load_notify(move |reloaded: Arc<BaarConfig>| {
            if reloaded.theme.stylesheets != startup_sources {
                warn!("Stylesheet list changed, restart baar to apply it");
            }
        });

        debug!("🖥️ Initializing display topology...");
        let topology = Arc::new(StaticTopology::new(&config.outputs));
        let display_server: Arc<dyn DisplayServer> = topology.clone();
        let compositor: Arc<dyn Compositor> = topology.clone();
        let surfaces = SurfaceManager::new(IdentityResolver::new(display_server, compositor));

        loader.store(config);
        info!("✅ All subsystems initialized successfully");

        Ok(Self {
            config_path,
            config: loader,
            theme,
            theme_sources,
            topology,
            surfaces,
            factory: Arc::new(LoggingSurfaceFactory::new("bar")),
            stop: AbortController::new(),
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Last successfully loaded configuration
    pub fn config(&self) -> Option<Arc<BaarConfig>> {
        self.config.get()
    }

    pub fn surfaces(&self) -> &SurfaceManager {
        &self.surfaces
    }

    pub fn theme(&self) -> &ThemeManager {
        &self.theme
    }

    pub fn factory(&self) -> &Arc<LoggingSurfaceFactory> {
        &self.factory
    }

    /// Apply the theme and build a bar on every attached display
    pub async fn bootstrap(&self) -> Vec<CachedSurface> {
        self.theme
            .notify_once_on_load(|path| info!("🎨 First stylesheet applied from {}", path.display()));

        let (theme, surfaces) = tokio::join!(
            self.theme.sync_load_style(),
            self.surfaces.bootstrap_all(self.factory.clone())
        );
        if theme.is_err() {
            warn!("⚠️ Surfaces start without a stylesheet");
        }
        surfaces
    }

    /// Path of the applied stylesheet, waiting for a pending rebuild if none landed yet
    pub async fn current_theme(&self) -> Result<PathBuf, ShellError> {
        if let Some(path) = self.theme.last_applied() {
            return Ok(path);
        }
        let wait_ms = self
            .config()
            .map(|config| config.general.theme_wait_timeout_ms)
            .unwrap_or_else(|| BaarConfig::default().general.theme_wait_timeout_ms);
        self.theme.wait_for_load(Duration::from_millis(wait_ms)).await
    }

    /// Reload the configuration, then the topology and the theme.
    ///
    /// Returns how many topology events were handled. A failed reload keeps
    /// the last-good configuration and leaves the displays untouched.
    pub async fn reload(&self) -> usize {
        let config = match self.config.sync_load().await {
            Ok(config) => config,
            Err(_) => return 0,
        };
        let handled = self.apply_topology(&config).await;
        if self.theme.sync_load_style().await.is_err() {
            warn!("⚠️ Keeping the previous stylesheet");
        }
        handled
    }

    async fn apply_topology(&self, config: &BaarConfig) -> usize {
        let events = self.topology.replace(&config.outputs);
        for event in &events {
            match event {
                TopologyEvent::Added(monitor) => {
                    self.surfaces.on_display_added(monitor).await;
                }
                TopologyEvent::Removed(monitor) => {
                    self.surfaces.on_display_removed(monitor).await;
                }
            }
        }
        if !events.is_empty() {
            info!("🔄 Topology changed: {} event(s), {} surface(s) live", events.len(), self.surfaces.surface_count());
        }
        events.len()
    }

    /// React to a batch of changed files from the watcher
    pub async fn on_files_changed(&self, changed: Vec<PathBuf>) {
        if changed.contains(&self.config_path) {
            info!("📄 {} changed, reloading", self.config_path.display());
            self.reload().await;
        } else if changed.iter().any(|path| self.theme_sources.contains(path)) {
            info!("🎨 Stylesheet changed, rebuilding theme");
            if self.theme.sync_load_style().await.is_err() {
                warn!("⚠️ Keeping the previous stylesheet");
            }
        }
    }

    fn spawn_watcher(&self, changes: mpsc::Sender<Vec<PathBuf>>) -> Option<JoinHandle<()>> {
        let config = self.config()?;
        if !config.general.watch {
            debug!("File watching disabled");
            return None;
        }

        let mut paths = vec![self.config_path.clone()];
        paths.extend(self.theme_sources.iter().cloned());
        let watcher = FileWatcher::new(paths, Duration::from_millis(config.general.watch_interval_ms));

        let signal = self.stop.signal();
        Some(tokio::spawn(watcher.run(signal, move |changed| {
            let changes = changes.clone();
            async move {
                if changes.send(changed).await.is_err() {
                    debug!("Shell stopped listening for file changes");
                }
            }
        })))
    }

    /// Bootstrap, then serve reloads until SIGINT or SIGTERM
    pub async fn run(&self) -> Result<()> {
        info!("🎬 Starting Baar event loop");
        self.bootstrap().await;

        let mut hangup = signal(SignalKind::hangup())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        let (changes_tx, mut changes) = mpsc::channel(8);
        let watcher = self.spawn_watcher(changes_tx);

        loop {
            tokio::select! {
                _ = interrupt.recv() => {
                    info!("📨 Received SIGINT (Ctrl+C), shutting down gracefully");
                    break;
                }
                _ = terminate.recv() => {
                    info!("📨 Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = hangup.recv() => {
                    info!("📨 Received SIGHUP, reloading");
                    self.reload().await;
                }
                Some(changed) = changes.recv() => self.on_files_changed(changed).await,
            }
        }

        self.shutdown();
        if let Some(watcher) = watcher {
            if let Err(e) = watcher.await {
                warn!("File watcher ended abnormally: {}", e);
            }
        }
        info!("🛑 Baar event loop finished");
        Ok(())
    }

    /// Stop background work and destroy every surface
    pub fn shutdown(&self) -> usize {
        info!("🔽 Shutting down Baar...");
        self.stop.abort();
        let destroyed = self.surfaces.teardown_all();
        info!("✅ Destroyed {} surface(s)", destroyed);
        destroyed
    }
}
