//! Per-event routing.
//!
//! Every creation event ends in exactly one [`RouteOutcome`]:
//!
//! ```text
//! Received ─┬─ directory ─────────────► Ignored
//!           ├─ suffix filter fails ───► Filtered
//!           ├─ no rule matches ───────► Unmatched
//!           ├─ move succeeds ─────────► Moved
//!           └─ move fails ────────────► Failed
//! ```
//!
//! The engine holds no state: the configuration snapshot is passed in with
//! each call, so a reload never changes the rules under a running event.

use crate::config::{Config, Rule};
use crate::event::FileEvent;
use crate::matcher::match_rule;
use crate::mover::{MoveError, MoveExecutor, Moved};
use crate::suffix_filter;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// What the routing policy decides for a file name, before anything moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<'a> {
    /// Rejected by the suffix filter.
    Filtered,
    /// No rule keyword occurs in the name; the file stays put.
    Unmatched,
    /// The first matching rule and the directory it resolves to.
    Matched {
        rule: &'a Rule,
        destination_dir: PathBuf,
    },
}

impl Decision<'_> {
    pub fn is_matched(&self) -> bool {
        matches!(self, Decision::Matched { .. })
    }
}

/// Terminal state of one event.
#[derive(Debug)]
pub enum RouteOutcome {
    Ignored,
    Filtered,
    Unmatched,
    Moved(Moved),
    Failed(MoveError),
}

impl RouteOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RouteOutcome::Ignored => "ignored",
            RouteOutcome::Filtered => "filtered",
            RouteOutcome::Unmatched => "unmatched",
            RouteOutcome::Moved(_) => "moved",
            RouteOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_moved(&self) -> bool {
        matches!(self, RouteOutcome::Moved(_))
    }
}

/// Routes creation events using a configuration snapshot.
pub struct RoutingEngine;

impl RoutingEngine {
    /// Applies the suffix filter and the rule list to a file name.
    pub fn decide<'a>(file_name: &str, config: &'a Config) -> Decision<'a> {
        if !suffix_filter::passes(file_name, config.suffix_filter.as_ref()) {
            return Decision::Filtered;
        }

        match match_rule(file_name, &config.rules) {
            Some(rule) => Decision::Matched {
                rule,
                destination_dir: MoveExecutor::resolve_destination(rule, config),
            },
            None => Decision::Unmatched,
        }
    }

    /// Handles one creation event to completion.
    ///
    /// Never panics and never returns an error: move failures are logged and
    /// reported as [`RouteOutcome::Failed`].
    pub fn route(event: &FileEvent, config: &Config) -> RouteOutcome {
        info!("{} created: {}", event.kind_label(), event.path.display());

        if event.is_directory {
            return RouteOutcome::Ignored;
        }

        let Some(file_name) = event.file_name() else {
            debug!(path = %event.path.display(), "Event path has no file name");
            return RouteOutcome::Unmatched;
        };

        match Self::decide(&file_name, config) {
            Decision::Filtered => {
                debug!(file = %file_name, "Skipped by suffix filter");
                RouteOutcome::Filtered
            }
            Decision::Unmatched => {
                debug!(file = %file_name, "No rule matched, leaving file in place");
                RouteOutcome::Unmatched
            }
            Decision::Matched {
                rule,
                destination_dir,
            } => match MoveExecutor::move_into(&event.path, &destination_dir) {
                Ok(moved) => {
                    info!(
                        keyword = %rule.keyword,
                        "File moved: {} -> {}",
                        moved.original_path.display(),
                        moved.destination_dir.display()
                    );
                    RouteOutcome::Moved(moved)
                }
                Err(e) if e.is_target_is_file() => {
                    warn!(keyword = %rule.keyword, "{e}");
                    RouteOutcome::Failed(e)
                }
                Err(e) => {
                    error!(keyword = %rule.keyword, "{e}");
                    RouteOutcome::Failed(e)
                }
            },
        }
    }
}
