//! Serialized, reloadable configuration values
//!
//! A `LockedLoader` keeps the last successfully loaded value of one config
//! source. Reloads go through the loader's own runner so two reloads of the
//! same file never interleave; a failed or timed-out reload is logged and the
//! last-good value stays in place.

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info};
use parking_lot::RwLock;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ShellError;
use crate::logging::{self, Measured};
use crate::sync::{CancellationSignal, SerializedRunner};

type LoadFn<T> = Box<dyn Fn(CancellationSignal) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;
type Listener<T> = Arc<dyn Fn(Arc<T>) + Send + Sync>;

pub struct LockedLoader<T> {
    name: String,
    load: LoadFn<T>,
    current: RwLock<Option<Arc<T>>>,
    listeners: RwLock<Vec<Listener<T>>>,
    runner: SerializedRunner,
}

impl<T: Send + Sync + 'static> LockedLoader<T> {
    pub fn new<F, Fut>(name: impl Into<String>, runner: SerializedRunner, load: F) -> Self
    where
        F: Fn(CancellationSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            load: Box::new(move |signal| load(signal).boxed()),
            current: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
            runner,
        }
    }

    /// Loader that reads `path` and hands the text to `parse`
    pub fn from_file(path: impl AsRef<Path>, runner: SerializedRunner, parse: fn(&str) -> anyhow::Result<T>) -> Self {
        let path: PathBuf = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        Self::new(name, runner, move |signal: CancellationSignal| {
            let path = path.clone();
            async move {
                let contents = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| anyhow::Error::new(e).context(format!("Failed to read config file: {}", path.display())))?;
                if signal.is_aborted() {
                    anyhow::bail!("reload of {} abandoned", path.display());
                }
                parse(&contents)
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last successfully loaded value
    pub fn get(&self) -> Option<Arc<T>> {
        self.current.read().clone()
    }

    /// Install `value` as the last-good value without running the load routine.
    ///
    /// Listeners are not notified.
    pub fn store(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        *self.current.write() = Some(value.clone());
        value
    }

    /// Current value, loading it first if nothing was loaded yet
    pub async fn get_or_load(&self) -> Result<Arc<T>, ShellError> {
        if let Some(current) = self.get() {
            return Ok(current);
        }
        self.sync_load().await
    }

    /// Reload through the runner, store the value and notify listeners
    pub async fn sync_load(&self) -> Result<Arc<T>, ShellError> {
        let _measured = Measured::new("sync_load");
        match self.runner.run(|signal| (self.load)(signal)).await {
            Ok(value) => {
                let value = Arc::new(value);
                *self.current.write() = Some(value.clone());
                info!("Loaded config: {}", self.name);
                self.notify(&value);
                Ok(value)
            }
            Err(e) => {
                logging::except(&format!("Unable to load config: {}", self.name), &e);
                Err(e)
            }
        }
    }

    /// Register a callback invoked after every successful load
    pub fn on_load_notify<F>(&self, callback: F)
    where
        F: Fn(Arc<T>) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(callback));
    }

    fn notify(&self, value: &Arc<T>) {
        let listeners = self.listeners.read().clone();
        debug!("Notifying {} listener(s) of {}", listeners.len(), self.name);
        for listener in listeners {
            listener(value.clone());
        }
    }
}
