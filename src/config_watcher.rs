//! Live reload of the configuration file.
//!
//! The watcher observes the directory that contains the configuration file
//! (editors often replace files instead of writing them in place), debounces
//! bursts of changes, and asks the [`ConfigStore`] to reload. A failed reload
//! leaves the previous snapshot in charge.

use crate::config::Config;
use crate::snapshot::ConfigStore;
use crate::watcher::WatchError;
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the ConfigWatcher
#[derive(Debug, Clone)]
pub struct ConfigWatcherOptions {
    /// Debounce duration in milliseconds
    pub debounce_ms: u64,
}

impl Default for ConfigWatcherOptions {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

/// Event emitted after every reload attempt
#[derive(Debug, Clone)]
pub struct ReloadEvent {
    /// Whether the new configuration was accepted
    pub success: bool,
    /// Path to the config file that triggered the reload
    pub path: PathBuf,
    /// Error message if the reload was rejected
    pub error: Option<String>,
    /// The snapshot now in effect, on success
    pub config: Option<Arc<Config>>,
}

/// Watches the configuration file and reloads the store on change.
pub struct ConfigWatcher {
    config_path: PathBuf,
    reload_tx: broadcast::Sender<ReloadEvent>,
    task: JoinHandle<()>,
    /// Handle to keep the watcher alive
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl ConfigWatcher {
    /// Starts watching the file behind `store`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the store has no backing file or the OS watch cannot be set up.
    pub fn spawn(store: Arc<ConfigStore>, options: ConfigWatcherOptions) -> Result<Self, WatchError> {
        let config_path = store
            .location()
            .map(Path::to_path_buf)
            .ok_or(WatchError::NoConfigFile)?;
        let file_name = config_path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or(WatchError::NoConfigFile)?;
        let watch_dir = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (reload_tx, _) = broadcast::channel(16);
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(
            Duration::from_millis(options.debounce_ms),
            None,
            move |res: DebounceEventResult| {
                let _ = notify_tx.send(res);
            },
        )?;
        debouncer.watch(&watch_dir, RecursiveMode::NonRecursive)?;
        info!("Watching config file: {}", config_path.display());

        let tx = reload_tx.clone();
        let path = config_path.clone();
        let task = tokio::spawn(async move {
            while let Some(result) = notify_rx.recv().await {
                match result {
                    Ok(events) => {
                        let touched = events
                            .iter()
                            .any(|event| Self::is_config_event(&event.kind, &event.paths, &file_name));
                        if !touched {
                            continue;
                        }

                        if !path.exists() {
                            info!("Config file removed, keeping current configuration");
                            continue;
                        }

                        info!("Config file modified, reloading configs...");
                        let event = reload_event(&store, &path).await;
                        let _ = tx.send(event);
                    }
                    Err(errors) => {
                        for error in errors {
                            warn!("Config watcher error: {:?}", error);
                        }
                    }
                }
            }
            debug!("Config watcher channel closed");
        });

        Ok(Self {
            config_path,
            reload_tx,
            task,
            _debouncer: debouncer,
        })
    }

    /// Subscribe to reload events
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.reload_tx.subscribe()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Stops watching. Pending reloads are abandoned.
    pub fn stop(self) {
        self.task.abort();
    }

    /// True if the event touches the config file in a way worth reloading for.
    fn is_config_event(kind: &EventKind, paths: &[PathBuf], file_name: &OsString) -> bool {
        let relevant = matches!(
            kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        );
        relevant
            && paths
                .iter()
                .any(|path| path.file_name() == Some(file_name.as_os_str()))
    }
}

/// Reloads `store` on the blocking pool and reports the result.
async fn reload_event(store: &Arc<ConfigStore>, path: &Path) -> ReloadEvent {
    let reloading = Arc::clone(store);
    let result = match tokio::task::spawn_blocking(move || reloading.reload()).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("reload task failed: {e}")),
    };

    match result {
        Ok(config) => ReloadEvent {
            success: true,
            path: path.to_path_buf(),
            error: None,
            config: Some(config),
        },
        Err(error) => ReloadEvent {
            success: false,
            path: path.to_path_buf(),
            error: Some(error),
            config: None,
        },
    }
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("config_path", &self.config_path)
            .finish()
    }
}
