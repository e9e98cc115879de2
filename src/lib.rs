//! dropsort - route files dropped into a directory by keyword rules
//!
//! This library watches a source directory, filters new files by suffix,
//! picks the first rule whose keyword occurs in the file name and moves the
//! file into that rule's destination. The YAML or TOML configuration is
//! reloaded while running; a bad edit never replaces a working configuration.

pub mod cli;
pub mod config;
pub mod config_watcher;
pub mod engine;
pub mod event;
pub mod matcher;
pub mod mover;
pub mod output;
pub mod snapshot;
pub mod suffix_filter;
pub mod watcher;

pub use config::{Config, ConfigError, ConfigSource, FileSource, Rule};
pub use config_watcher::{ConfigWatcher, ReloadEvent};
pub use engine::{Decision, RouteOutcome, RoutingEngine};
pub use event::FileEvent;
pub use mover::{MoveError, MoveExecutor, Moved};
pub use snapshot::ConfigStore;
pub use suffix_filter::SuffixFilter;
pub use watcher::{Service, WatchError, WatchOptions};

pub use cli::{Cli, run_cli};
