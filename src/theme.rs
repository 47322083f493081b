//! Theme reloading
//!
//! Rebuilding the stylesheet writes files, so two rebuilds must never
//! interleave: every rebuild goes through the theme's runner. Callers that
//! need to know when a rebuild has landed either register a one-shot
//! callback or wait on the pending completion handle with a bound.

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use log::{info, warn};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ShellError;
use crate::logging::{self, Measured};
use crate::sync::{CancellationSignal, Deferred, SerializedRunner};

/// Produces the stylesheet applied to every surface
pub trait ThemeCompiler: Send + Sync {
    /// Build the stylesheet and return the path of the result
    fn compile<'a>(&'a self, signal: &'a CancellationSignal) -> BoxFuture<'a, anyhow::Result<PathBuf>>;
}

/// Concatenates stylesheet sources in order into one output file.
///
/// Unreadable sources are logged and contribute nothing. The output is
/// written to a sibling temp file and renamed into place.
pub struct CombineCompiler {
    sources: Vec<PathBuf>,
    output: PathBuf,
}

impl CombineCompiler {
    pub fn new(sources: Vec<PathBuf>, output: PathBuf) -> Self {
        Self { sources, output }
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    async fn read_sources(&self) -> Vec<String> {
        let reads = self.sources.iter().map(|path| async move {
            match tokio::fs::read_to_string(path).await {
                Ok(contents) => contents,
                Err(e) => {
                    warn!("Could not read stylesheet {}: {}", path.display(), e);
                    String::new()
                }
            }
        });
        join_all(reads).await
    }
}

impl ThemeCompiler for CombineCompiler {
    fn compile<'a>(&'a self, signal: &'a CancellationSignal) -> BoxFuture<'a, anyhow::Result<PathBuf>> {
        async move {
            let combined = self.read_sources().await.join("\n");
            if signal.is_aborted() {
                anyhow::bail!("theme rebuild abandoned before write");
            }
            write_atomically(&self.output, combined.as_bytes()).await?;
            Ok(self.output.clone())
        }
        .boxed()
    }
}

/// Write `contents` to a temp file beside `path`, then rename over it
pub async fn write_atomically(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    use anyhow::Context;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

type LoadCallback = Box<dyn FnOnce(&Path) + Send>;

pub struct ThemeManager {
    compiler: Arc<dyn ThemeCompiler>,
    runner: SerializedRunner,
    once_on_load: Mutex<Vec<LoadCallback>>,
    pending: Mutex<Deferred<PathBuf>>,
    applied: Mutex<Option<PathBuf>>,
}

impl ThemeManager {
    pub fn new(compiler: Arc<dyn ThemeCompiler>, runner: SerializedRunner) -> Self {
        Self {
            compiler,
            runner,
            once_on_load: Mutex::new(Vec::new()),
            pending: Mutex::new(Deferred::new()),
            applied: Mutex::new(None),
        }
    }

    /// Path of the last stylesheet that was built successfully
    pub fn last_applied(&self) -> Option<PathBuf> {
        self.applied.lock().clone()
    }

    /// Rebuild the stylesheet through the theme runner.
    ///
    /// On failure the previous stylesheet stays in place and nobody is notified.
    pub async fn sync_load_style(&self) -> Result<PathBuf, ShellError> {
        let _measured = Measured::new("sync_load_style");
        info!("Starting theme load");

        let compiler = self.compiler.clone();
        let outcome = self
            .runner
            .run(move |signal| async move { compiler.compile(&signal).await })
            .await;

        match outcome {
            Ok(path) => {
                info!("Theme loaded successfully: {}", path.display());
                *self.applied.lock() = Some(path.clone());
                self.notify(&path);
                Ok(path)
            }
            Err(e) => {
                logging::except("Unable to rebuild theme", &e);
                Err(e)
            }
        }
    }

    /// Run `callback` once, after the next successful load
    pub fn notify_once_on_load<F>(&self, callback: F)
    where
        F: FnOnce(&Path) + Send + 'static,
    {
        self.once_on_load.lock().push(Box::new(callback));
    }

    /// Wait until the next successful load, or fail with `Timeout`
    pub async fn wait_for_load(&self, timeout: Duration) -> Result<PathBuf, ShellError> {
        let pending = self.pending.lock().clone();
        pending.with_timeout(timeout).await
    }

    fn notify(&self, path: &Path) {
        let settled = std::mem::take(&mut *self.pending.lock());
        settled.resolve(path.to_path_buf());

        // Callbacks registered later go on top and run first.
        let mut callbacks = std::mem::take(&mut *self.once_on_load.lock());
        while let Some(callback) = callbacks.pop() {
            callback(path);
        }
    }
}
