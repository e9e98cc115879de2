//! The active configuration snapshot.
//!
//! Readers take an `Arc<Config>` with a single atomic load and keep using it
//! for as long as they like; a reload publishes a new `Arc` without touching
//! the old one, so no reader can observe a partially built configuration.

use crate::config::{Config, ConfigError, ConfigSource};
use arc_swap::ArcSwap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Holds the current snapshot and the source it is reloaded from.
pub struct ConfigStore {
    current: ArcSwap<Config>,
    source: Box<dyn ConfigSource>,
}

impl ConfigStore {
    /// Loads and validates the initial snapshot.
    ///
    /// # Errors
    ///
    /// Returns the validation error unchanged; the caller decides whether an
    /// invalid startup configuration ends the process.
    pub fn open(source: impl ConfigSource + 'static) -> Result<Arc<Self>, ConfigError> {
        let config = source.load()?;
        match source.location() {
            Some(path) => info!("Config file loaded: {}", path.display()),
            None => info!("Config loaded"),
        }
        config.log_summary();

        Ok(Arc::new(Self {
            current: ArcSwap::from_pointee(config),
            source: Box::new(source),
        }))
    }

    /// Returns the snapshot in effect right now.
    pub fn current(&self) -> Arc<Config> {
        self.current.load_full()
    }

    /// File the configuration is read from, if any.
    pub fn location(&self) -> Option<&Path> {
        self.source.location()
    }

    /// Re-reads the source and swaps in the new snapshot.
    ///
    /// On any error the previous snapshot stays active.
    pub fn reload(&self) -> Result<Arc<Config>, ConfigError> {
        match self.source.load() {
            Ok(config) => {
                let config = Arc::new(config);
                self.current.store(Arc::clone(&config));
                info!("Config reloaded");
                config.log_summary();
                Ok(config)
            }
            Err(e) => {
                error!("Invalid config file, keeping previous configuration: {e}");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("config", &*self.current.load())
            .field("location", &self.location())
            .finish()
    }
}
