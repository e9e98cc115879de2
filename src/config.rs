//! Routing configuration.
//!
//! This module loads the routing rules from a YAML (or TOML) file and turns
//! them into a validated, immutable [`Config`] snapshot. A snapshot is never
//! patched in place: a reload always builds a brand-new one.
//!
//! # Configuration File Format
//!
//! ```yaml
//! source: /home/me/Downloads/inbox
//! target: /home/me/Documents/sorted
//! recursive: false
//!
//! suffix:
//!   excludes: [".tmp", ".part"]
//!   includes: [".pdf", ".csv"]
//!
//! rules:
//!   - keyword: invoice
//!     folder: invoices
//!   - keyword: report
//!     target: /srv/reports
//! ```
//!
//! `source`, `target` and `rules` are required. Rules are evaluated in the
//! order they are declared.

use crate::suffix_filter::SuffixFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "dropsort.yaml";

/// Errors that can occur while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// A required top-level key is absent or null.
    #[error("Invalid configuration: missing required key '{0}'")]
    MissingKey(&'static str),

    /// Invalid YAML/TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A configured path could not be made absolute.
    #[error("Invalid path '{}' in configuration: {error}", path.display())]
    InvalidPath {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// IO error while reading configuration.
    #[error("IO error reading configuration {}: {error}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

/// Configuration exactly as it appears in the file, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    /// Directory to watch.
    pub source: Option<PathBuf>,
    /// Default destination directory.
    pub target: Option<PathBuf>,
    /// Ordered routing rules.
    pub rules: Option<Vec<RawRule>>,
    /// Optional suffix allow/deny lists.
    pub suffix: Option<SuffixRules>,
    /// Watch subdirectories of `source` too. Defaults to false.
    #[serde(default)]
    pub recursive: bool,
}

/// A single rule as written in the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRule {
    pub keyword: Option<String>,
    pub folder: Option<PathBuf>,
    pub target: Option<PathBuf>,
}

/// Suffix lists as written in the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuffixRules {
    /// Extensions that are never routed (e.g. ".tmp").
    pub excludes: Option<Vec<String>>,
    /// Extensions that are the only ones routed, when non-empty.
    pub includes: Option<Vec<String>>,
}

/// A keyword-to-destination mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    /// Literal, case-sensitive substring searched for in the file name.
    pub keyword: String,
    /// Sub-path below the default target.
    pub folder: Option<PathBuf>,
    /// Absolute directory that overrides the default target entirely.
    pub target: Option<PathBuf>,
}

impl Rule {
    /// Creates a rule that sends matches to the default target.
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            folder: None,
            target: None,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Rules without a keyword never match anything.
    pub fn is_matchable(&self) -> bool {
        !self.keyword.is_empty()
    }
}

/// One complete, validated, immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Absolute path of the watched directory.
    pub source: PathBuf,
    /// Absolute path used when a matching rule has no target of its own.
    pub default_target: PathBuf,
    pub suffix_filter: Option<SuffixFilter>,
    pub rules: Vec<Rule>,
    pub recursive: bool,
}

impl Config {
    /// Validates raw file contents into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingKey` if `source`, `target` or `rules` is
    /// absent, and `ConfigError::InvalidPath` if a path cannot be resolved.
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let source = raw.source.ok_or(ConfigError::MissingKey("source"))?;
        let target = raw.target.ok_or(ConfigError::MissingKey("target"))?;
        let raw_rules = raw.rules.ok_or(ConfigError::MissingKey("rules"))?;

        let rules = raw_rules
            .into_iter()
            .map(|rule| {
                let target = rule.target.as_deref().map(absolute).transpose()?;
                Ok(Rule {
                    keyword: rule.keyword.unwrap_or_default(),
                    folder: rule.folder,
                    target,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let suffix_filter = raw.suffix.as_ref().map(SuffixFilter::from_rules);

        Ok(Self {
            source: absolute(&source)?,
            default_target: absolute(&target)?,
            suffix_filter,
            rules,
            recursive: raw.recursive,
        })
    }

    /// Creates the source and default target directories if they are missing.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.source)?;
        fs::create_dir_all(&self.default_target)?;
        Ok(())
    }

    /// Logs the filter and rule set of this snapshot.
    pub fn log_summary(&self) {
        if let Some(filter) = &self.suffix_filter {
            if filter.has_excludes() {
                let excludes: Vec<&str> = filter.excludes().collect();
                info!(?excludes, "Exclude suffix");
            }
            if filter.has_includes() {
                let includes: Vec<&str> = filter.includes().collect();
                info!(?includes, "Include suffix");
            }
        }

        info!("Matching {} rules:", self.rules.len());
        for rule in &self.rules {
            if !rule.is_matchable() {
                warn!("- Rule without keyword will never match");
                continue;
            }
            match (&rule.target, &rule.folder) {
                (Some(target), _) => {
                    info!("- Keyword: '{}' -> Target: '{}'", rule.keyword, target.display())
                }
                (None, Some(folder)) => {
                    info!("- Keyword: '{}' -> Folder: '{}'", rule.keyword, folder.display())
                }
                (None, None) => info!("- Keyword: '{}' -> Default target", rule.keyword),
            }
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|error| ConfigError::InvalidPath {
        path: path.to_path_buf(),
        error,
    })
}

/// Anything that can produce configuration data on demand.
///
/// The watcher re-invokes [`ConfigSource::load`] every time the underlying
/// source changes.
pub trait ConfigSource: Send + Sync {
    /// Reads the raw, unvalidated configuration.
    fn read(&self) -> Result<RawConfig, ConfigError>;

    /// File backing this source, if any. Used for change notification.
    fn location(&self) -> Option<&Path>;

    /// Reads and validates a fresh snapshot.
    fn load(&self) -> Result<Config, ConfigError> {
        Config::from_raw(self.read()?)
    }
}

/// Configuration stored in a YAML or TOML file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Locates the configuration file.
    ///
    /// Attempts the following in order:
    /// 1. If `config_path` is provided, use that file
    /// 2. Look for `dropsort.yaml` in the current directory
    /// 3. Look for `~/.config/dropsort/config.yaml` in home directory
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if no file exists.
    pub fn discover(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
            }
            return Ok(Self::new(path));
        }

        let local_config = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local_config.exists() {
            return Ok(Self::new(local_config));
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("dropsort")
                .join("config.yaml");
            if home_config.exists() {
                return Ok(Self::new(home_config));
            }
        }

        Err(ConfigError::ConfigNotFound(local_config))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_toml(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
    }
}

impl ConfigSource for FileSource {
    fn read(&self) -> Result<RawConfig, ConfigError> {
        if !self.path.exists() {
            return Err(ConfigError::ConfigNotFound(self.path.clone()));
        }

        let content = fs::read_to_string(&self.path).map_err(|error| ConfigError::IoError {
            path: self.path.clone(),
            error,
        })?;

        if content.trim().is_empty() {
            return Err(ConfigError::ConfigInvalid(
                "configuration file is empty".to_string(),
            ));
        }

        if self.is_toml() {
            toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
        } else {
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
        }
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
