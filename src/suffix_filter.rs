//! Extension allow/deny filtering.
//!
//! Extensions are compared in normalized form: lower-cased and including the
//! leading dot (`report.CSV` has extension `.csv`). A file without an
//! extension has the empty extension `""`, which only matches an empty entry.

use crate::config::SuffixRules;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Compiled suffix filter.
///
/// Excludes are authoritative: an excluded extension is never reconsidered by
/// the include list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuffixFilter {
    excludes: BTreeSet<String>,
    includes: BTreeSet<String>,
}

impl SuffixFilter {
    /// Builds a filter from exclude and include entries, normalizing each one.
    pub fn new<E, I, S>(excludes: E, includes: I) -> Self
    where
        E: IntoIterator<Item = S>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excludes: excludes
                .into_iter()
                .map(|ext| normalize_entry(ext.as_ref()))
                .collect(),
            includes: includes
                .into_iter()
                .map(|ext| normalize_entry(ext.as_ref()))
                .collect(),
        }
    }

    /// Builds a filter from the `suffix` section of a configuration file.
    pub fn from_rules(rules: &SuffixRules) -> Self {
        Self::new(
            rules.excludes.iter().flatten(),
            rules.includes.iter().flatten(),
        )
    }

    pub fn has_excludes(&self) -> bool {
        !self.excludes.is_empty()
    }

    pub fn has_includes(&self) -> bool {
        !self.includes.is_empty()
    }

    pub fn excludes(&self) -> impl Iterator<Item = &str> {
        self.excludes.iter().map(String::as_str)
    }

    pub fn includes(&self) -> impl Iterator<Item = &str> {
        self.includes.iter().map(String::as_str)
    }

    /// Returns true if a file with this name should be routed.
    pub fn passes(&self, file_name: &str) -> bool {
        let extension = extension_of(file_name);

        if self.excludes.contains(&extension) {
            return false;
        }

        if self.has_includes() {
            return self.includes.contains(&extension);
        }

        true
    }
}

/// Applies an optional filter; an absent filter lets everything through.
pub fn passes(file_name: &str, filter: Option<&SuffixFilter>) -> bool {
    filter.is_none_or(|filter| filter.passes(file_name))
}

/// Normalized extension of a file name: `".pdf"`, or `""` when there is none.
pub fn extension_of(file_name: &str) -> String {
    match Path::new(file_name).extension() {
        Some(ext) if !ext.is_empty() => format!(".{}", ext.to_string_lossy().to_lowercase()),
        _ => String::new(),
    }
}

/// Lower-cases an entry and adds the leading dot if it is missing.
fn normalize_entry(entry: &str) -> String {
    let entry = entry.trim().to_lowercase();
    if entry.is_empty() || entry.starts_with('.') {
        entry
    } else {
        format!(".{entry}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("report.CSV"), ".csv");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("Makefile"), "");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("trailing."), "");
    }

    #[test]
    fn test_absent_filter_always_passes() {
        assert!(passes("anything.tmp", None));
        assert!(passes("no_extension", None));
    }

    #[test]
    fn test_exclude_is_case_insensitive() {
        let filter = SuffixFilter::new([".tmp"], []);
        assert!(!filter.passes("a.TMP"));
        assert!(!filter.passes("a.tmp"));
        assert!(filter.passes("a.txt"));
    }

    #[test]
    fn test_include_rejects_unlisted_extension() {
        let filter = SuffixFilter::new([], [".pdf"]);
        assert!(!filter.passes("a.docx"));
        assert!(filter.passes("a.PDF"));
        assert!(!filter.passes("no_extension"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter = SuffixFilter::new([".tmp"], [".tmp"]);
        assert!(!filter.passes("a.tmp"));
    }

    #[test]
    fn test_entries_without_dot_are_normalized() {
        let filter = SuffixFilter::new(["TMP"], ["pdf"]);
        assert_eq!(filter.excludes().collect::<Vec<_>>(), vec![".tmp"]);
        assert!(!filter.passes("x.tmp"));
        assert!(filter.passes("x.pdf"));
    }

    #[test]
    fn test_empty_entry_matches_extensionless_files() {
        let filter = SuffixFilter::new([""], []);
        assert!(!filter.passes("README"));
        assert!(filter.passes("README.md"));

        let filter = SuffixFilter::new([], [""]);
        assert!(filter.passes("README"));
        assert!(!filter.passes("README.md"));
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        let filter = SuffixFilter::default();
        assert!(filter.passes("a.tmp"));
        assert!(filter.passes("b"));
    }

    #[test]
    fn test_from_rules_with_missing_lists() {
        let rules = SuffixRules {
            excludes: Some(vec![".log".to_string()]),
            includes: None,
        };
        let filter = SuffixFilter::from_rules(&rules);
        assert!(filter.has_excludes());
        assert!(!filter.has_includes());
        assert!(!filter.passes("debug.log"));
    }
}
