//! The watch loop: source directory events in, routed files out.
//!
//! A [`SourceWatcher`] turns `notify` creation events into [`FileEvent`]s on an
//! unbounded channel, so notify's own thread never waits on the loop. The
//! [`Service`] loop takes each event, captures the configuration snapshot in
//! effect at that moment and hands both to the [`Dispatcher`]. Events for the
//! same path always land on the same worker, so they are handled in the order
//! they were observed. Backpressure lives on the bounded worker queues.

use crate::config::{Config, ConfigError};
use crate::config_watcher::{ConfigWatcher, ConfigWatcherOptions, ReloadEvent};
use crate::engine::RoutingEngine;
use crate::event::{FileEvent, creation_events};
use crate::snapshot::ConfigStore;
use arc_swap::ArcSwapOption;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const WORKER_QUEUE_CAPACITY: usize = 256;

/// Errors that stop the watch loop from starting.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Failed to prepare directories: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No configuration file to watch")]
    NoConfigFile,
}

/// Subscribes to creation events under one root directory.
pub struct SourceWatcher {
    watcher: RecommendedWatcher,
    root: Option<(PathBuf, bool)>,
    /// Root as seen by the notify callback.
    shared_root: Arc<ArcSwapOption<PathBuf>>,
}

impl SourceWatcher {
    /// Creates an idle watcher that forwards creation events to `event_tx`.
    ///
    /// The callback runs on notify's thread and never blocks: `watch` and
    /// `unwatch` wait for that same thread.
    pub fn new(event_tx: mpsc::UnboundedSender<FileEvent>) -> Result<Self, WatchError> {
        let shared_root: Arc<ArcSwapOption<PathBuf>> = Arc::new(ArcSwapOption::empty());
        let callback_root = Arc::clone(&shared_root);

        let watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let Some(root) = callback_root.load_full() else {
                        return;
                    };
                    for file_event in creation_events(&event, &root) {
                        if let Err(e) = event_tx.send(file_event) {
                            debug!("Dropping file event, loop has stopped: {}", e.0.path.display());
                        }
                    }
                }
                Err(e) => error!("Watch error: {e}"),
            },
        )?;

        Ok(Self {
            watcher,
            root: None,
            shared_root,
        })
    }

    /// Starts watching `root`.
    pub fn watch(&mut self, root: &Path, recursive: bool) -> Result<(), WatchError> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.watcher.watch(root, mode)?;
        debug!(recursive, "Started watching: {}", root.display());
        self.root = Some((root.to_path_buf(), recursive));
        self.shared_root.store(Some(Arc::new(root.to_path_buf())));
        Ok(())
    }

    /// Moves the subscription to a new root.
    ///
    /// A different root is watched before the old one is released, so a
    /// failure leaves the previous subscription in place.
    pub fn rewatch(&mut self, root: &Path, recursive: bool) -> Result<(), WatchError> {
        let previous = self.root.take();
        if let Some((old_root, _)) = &previous {
            // Same path with a new mode: notify needs an unwatch first.
            if old_root == root {
                let _ = self.watcher.unwatch(old_root);
            }
        }

        match self.watch(root, recursive) {
            Ok(()) => {
                if let Some((old_root, _)) = previous
                    && old_root != root
                {
                    let _ = self.watcher.unwatch(&old_root);
                }
                Ok(())
            }
            Err(e) => {
                if let Some((old_root, old_recursive)) = previous {
                    if old_root == root {
                        self.watch(&old_root, old_recursive)?;
                    } else {
                        self.shared_root.store(Some(Arc::new(old_root.clone())));
                        self.root = Some((old_root, old_recursive));
                    }
                }
                Err(e)
            }
        }
    }

    /// Stops the subscription. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some((root, _)) = self.root.take() {
            self.shared_root.store(None);
            let _ = self.watcher.unwatch(&root);
            info!("Observer stopped watching: {}", root.display());
        }
    }

    /// The directory currently watched, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_ref().map(|(root, _)| root.as_path())
    }

    pub fn is_recursive(&self) -> bool {
        self.root.as_ref().is_some_and(|(_, recursive)| *recursive)
    }
}

struct Job {
    event: FileEvent,
    config: Arc<Config>,
}

/// Fixed pool of routing workers, sharded by path.
pub struct Dispatcher {
    queues: Vec<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns `workers` worker tasks (at least one).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(workers: usize) -> Self {
        let count = workers.max(1);
        let mut queues = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for id in 0..count {
            let (tx, mut rx) = mpsc::channel::<Job>(WORKER_QUEUE_CAPACITY);
            queues.push(tx);
            handles.push(tokio::spawn(async move {
                while let Some(Job { event, config }) = rx.recv().await {
                    let path = event.path.clone();
                    let waited_ms = event.age_ms();
                    let result =
                        tokio::task::spawn_blocking(move || RoutingEngine::route(&event, &config))
                            .await;
                    match result {
                        Ok(outcome) => debug!(
                            worker = id,
                            outcome = outcome.label(),
                            waited_ms,
                            "Handled {}",
                            path.display()
                        ),
                        Err(e) => error!(worker = id, "Routing task failed for {}: {e}", path.display()),
                    }
                }
                debug!(worker = id, "Worker stopped");
            }));
        }

        Self {
            queues,
            workers: handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    /// Queues an event together with the snapshot it must be routed under.
    ///
    /// Waits if the worker's queue is full.
    pub async fn dispatch(&self, event: FileEvent, config: Arc<Config>) {
        let shard = shard_for(&event.path, self.queues.len());
        if let Err(e) = self.queues[shard].send(Job { event, config }).await {
            warn!("Worker queue closed, dropping event: {}", e.0.event.path.display());
        }
    }

    /// Closes every queue and waits for queued and in-flight work to finish.
    pub async fn shutdown(self) {
        drop(self.queues);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Worker task failed: {e}");
            }
        }
    }
}

/// Picks the worker responsible for `path`.
pub fn shard_for(path: &Path, shards: usize) -> usize {
    if shards <= 1 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

/// Options for [`Service::run`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Number of routing workers.
    pub workers: usize,
    /// Follow changes to the configuration file.
    pub reload: bool,
    /// Debounce window for configuration changes.
    pub debounce_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            reload: true,
            debounce_ms: 500,
        }
    }
}

/// The long-running watch service.
pub struct Service;

impl Service {
    /// Watches the configured source until `shutdown` resolves.
    ///
    /// On shutdown the event channel is closed and the source subscription
    /// dropped, then the workers finish everything already dispatched before
    /// this returns.
    ///
    /// # Errors
    ///
    /// Fails only during startup: directories that cannot be created, a
    /// source that cannot be watched, or a config file that cannot be followed.
    pub async fn run<F>(
        store: Arc<ConfigStore>,
        options: WatchOptions,
        shutdown: F,
    ) -> Result<(), WatchError>
    where
        F: Future<Output = ()>,
    {
        let config = store.current();
        config.ensure_directories()?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut source_watcher = SourceWatcher::new(event_tx)?;
        source_watcher.watch(&config.source, config.recursive)?;
        info!(
            "Observer start watching: {} -> {}",
            config.source.display(),
            config.default_target.display()
        );

        let config_watcher = if options.reload {
            let options = ConfigWatcherOptions {
                debounce_ms: options.debounce_ms,
            };
            Some(ConfigWatcher::spawn(Arc::clone(&store), options)?)
        } else {
            None
        };
        let mut reload_rx = config_watcher.as_ref().map(ConfigWatcher::subscribe);

        let dispatcher = Dispatcher::new(options.workers);
        info!(workers = dispatcher.worker_count(), "Dispatcher started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = event_rx.recv() => match event {
                    Some(event) => dispatcher.dispatch(event, store.current()).await,
                    None => break,
                },
                reload = next_reload(&mut reload_rx) => {
                    if let Some(reload) = reload {
                        Self::apply_reload(&reload, &mut source_watcher).await;
                    }
                }
            }
        }

        if let Some(config_watcher) = config_watcher {
            config_watcher.stop();
        }
        event_rx.close();
        source_watcher.stop();
        let mut discarded = 0usize;
        while event_rx.recv().await.is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "Discarded events received after shutdown");
        }

        dispatcher.shutdown().await;
        info!("Observer stopped");
        Ok(())
    }

    /// Follows a successful reload: new directories, new watch root.
    async fn apply_reload(reload: &ReloadEvent, source_watcher: &mut SourceWatcher) {
        let Some(config) = reload.config.as_ref().filter(|_| reload.success) else {
            return;
        };

        let prepared = Arc::clone(config);
        match tokio::task::spawn_blocking(move || prepared.ensure_directories()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to prepare directories after reload: {e}"),
            Err(e) => error!("Directory preparation task failed: {e}"),
        }

        let root_changed = source_watcher.root() != Some(config.source.as_path())
            || source_watcher.is_recursive() != config.recursive;
        if root_changed
            && let Err(e) = source_watcher.rewatch(&config.source, config.recursive)
        {
            error!("Failed to watch {}: {e}", config.source.display());
            return;
        }

        info!(
            "Observer reloaded, watching: {} -> {}",
            config.source.display(),
            config.default_target.display()
        );
    }
}

/// Next reload event, or never if reloading is off or the watcher is gone.
async fn next_reload(rx: &mut Option<broadcast::Receiver<ReloadEvent>>) -> Option<ReloadEvent> {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };

    match receiver.recv().await {
        Ok(event) => Some(event),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(skipped, "Missed config reload events");
            None
        }
        Err(broadcast::error::RecvError::Closed) => {
            *rx = None;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileSource, Rule};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config_in(base: &Path, rules: Vec<Rule>) -> Arc<Config> {
        let config = Config {
            source: base.join("inbox"),
            default_target: base.join("sorted"),
            suffix_filter: None,
            rules,
            recursive: false,
        };
        config.ensure_directories().unwrap();
        Arc::new(config)
    }

    #[test]
    fn test_shard_for_is_stable_and_in_range() {
        let path = Path::new("/inbox/report.csv");
        let first = shard_for(path, 4);
        assert!(first < 4);
        assert_eq!(shard_for(path, 4), first);
        assert_eq!(shard_for(path, 1), 0);
        assert_eq!(shard_for(path, 0), 0);
    }

    #[test]
    fn test_watch_options_default() {
        let options = WatchOptions::default();
        assert_eq!(options.workers, 4);
        assert!(options.reload);
        assert_eq!(options.debounce_ms, 500);
    }

    #[tokio::test]
    async fn test_dispatcher_routes_and_drains_on_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(temp_dir.path(), vec![Rule::new("report").with_folder("reports")]);

        let mut paths = Vec::new();
        for i in 0..10 {
            let path = config.source.join(format!("report_{i}.csv"));
            fs::write(&path, "data").unwrap();
            paths.push(path);
        }

        let dispatcher = Dispatcher::new(3);
        assert_eq!(dispatcher.worker_count(), 3);
        for path in &paths {
            dispatcher.dispatch(FileEvent::file(path), Arc::clone(&config)).await;
        }
        dispatcher.shutdown().await;

        for i in 0..10 {
            assert!(!paths[i].exists());
            assert!(
                config
                    .default_target
                    .join(format!("reports/report_{i}.csv"))
                    .exists()
            );
        }
    }

    fn write_config(base: &Path, folder: &str) -> PathBuf {
        let path = base.join("dropsort.yaml");
        let content = format!(
            "source: {}\ntarget: {}\nrules:\n  - keyword: scan\n    folder: {folder}\n",
            base.join("inbox").display(),
            base.join("sorted").display(),
        );
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_dispatched_event_keeps_its_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(temp_dir.path(), "old");
        let store = ConfigStore::open(FileSource::new(&config_path)).unwrap();
        store.current().ensure_directories().unwrap();
        let path = store.current().source.join("scan.png");
        fs::write(&path, "").unwrap();

        let dispatcher = Dispatcher::new(1);
        dispatcher.dispatch(FileEvent::file(&path), store.current()).await;
        write_config(temp_dir.path(), "new");
        store.reload().unwrap();
        dispatcher.shutdown().await;

        let sorted = temp_dir.path().join("sorted");
        assert!(sorted.join("old/scan.png").exists());
        assert!(!sorted.join("new/scan.png").exists());
    }

    #[tokio::test]
    async fn test_duplicate_events_move_once() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(temp_dir.path(), vec![Rule::new("scan")]);
        let path = config.source.join("scan_001.png");
        fs::write(&path, "").unwrap();

        let dispatcher = Dispatcher::new(4);
        dispatcher.dispatch(FileEvent::file(&path), Arc::clone(&config)).await;
        dispatcher.dispatch(FileEvent::file(&path), Arc::clone(&config)).await;
        dispatcher.shutdown().await;

        assert!(!path.exists());
        assert!(config.default_target.join("scan_001.png").exists());
    }

    #[tokio::test]
    async fn test_source_watcher_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("first");
        let second = temp_dir.path().join("second");
        fs::create_dir(&first).unwrap();
        fs::create_dir(&second).unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut watcher = SourceWatcher::new(tx).unwrap();
        assert!(watcher.root().is_none());

        watcher.watch(&first, false).unwrap();
        assert_eq!(watcher.root(), Some(first.as_path()));
        assert!(!watcher.is_recursive());

        watcher.rewatch(&second, true).unwrap();
        assert_eq!(watcher.root(), Some(second.as_path()));
        assert!(watcher.is_recursive());

        watcher.stop();
        assert!(watcher.root().is_none());
        watcher.stop();
    }

    #[tokio::test]
    async fn test_rewatch_missing_root_keeps_previous() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("first");
        fs::create_dir(&first).unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut watcher = SourceWatcher::new(tx).unwrap();
        watcher.watch(&first, false).unwrap();

        assert!(watcher.rewatch(&temp_dir.path().join("missing"), false).is_err());
        assert_eq!(watcher.root(), Some(first.as_path()));
    }

    #[test]
    fn test_stop_and_rewatch_do_not_wait_on_unread_events() {
        let temp_dir = TempDir::new().unwrap();
        let inbox = temp_dir.path().join("inbox");
        let other = temp_dir.path().join("other");
        fs::create_dir(&inbox).unwrap();
        fs::create_dir(&other).unwrap();

        // Nobody reads the receiver while events pile up.
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = SourceWatcher::new(tx).unwrap();
        watcher.watch(&inbox, false).unwrap();
        for i in 0..200 {
            fs::write(inbox.join(format!("file_{i}.txt")), "").unwrap();
        }
        std::thread::sleep(Duration::from_millis(200));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let rewatched = watcher.rewatch(&other, false).is_ok();
            watcher.stop();
            let _ = done_tx.send(rewatched);
        });

        let finished = done_rx.recv_timeout(Duration::from_secs(3));
        assert_eq!(finished, Ok(true));
        drop(rx);
    }

    #[tokio::test]
    async fn test_apply_reload_prepares_directories_and_moves_watch() {
        let temp_dir = TempDir::new().unwrap();
        let first = config_in(temp_dir.path(), Vec::new());
        let moved = Arc::new(Config {
            source: temp_dir.path().join("new_inbox"),
            default_target: temp_dir.path().join("new_sorted"),
            suffix_filter: None,
            rules: Vec::new(),
            recursive: false,
        });

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut watcher = SourceWatcher::new(tx).unwrap();
        watcher.watch(&first.source, false).unwrap();

        let rejected = ReloadEvent {
            success: false,
            path: temp_dir.path().join("dropsort.yaml"),
            error: Some("missing required key 'rules'".to_string()),
            config: None,
        };
        Service::apply_reload(&rejected, &mut watcher).await;
        assert_eq!(watcher.root(), Some(first.source.as_path()));

        let accepted = ReloadEvent {
            success: true,
            path: temp_dir.path().join("dropsort.yaml"),
            error: None,
            config: Some(Arc::clone(&moved)),
        };
        Service::apply_reload(&accepted, &mut watcher).await;

        assert!(moved.source.is_dir());
        assert!(moved.default_target.is_dir());
        assert_eq!(watcher.root(), Some(moved.source.as_path()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_service_stops_on_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_config(temp_dir.path(), "scans");
        let store = ConfigStore::open(FileSource::new(&config_path)).unwrap();
        let options = WatchOptions {
            workers: 2,
            reload: false,
            debounce_ms: 100,
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Service::run(store, options, tokio::time::sleep(Duration::from_millis(50))),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
        assert!(temp_dir.path().join("inbox").is_dir());
        assert!(temp_dir.path().join("sorted").is_dir());
    }
}
