//! Console output for the `check` and `explain` commands.
//!
//! The watch service reports through `tracing`; everything a user asks for
//! directly on the command line is printed here with consistent styling.

use crate::config::{Config, Rule};
use crate::engine::Decision;
use colored::*;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Warning messages (yellow with ⚠)
/// - The rule table of a configuration
/// - Routing decisions for `explain`
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dropsort::output::OutputFormatter;
    /// OutputFormatter::success("Configuration is valid");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Prints the directories, suffix filter and rules of a snapshot.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dropsort::config::{Config, Rule};
    /// use dropsort::output::OutputFormatter;
    /// use std::path::PathBuf;
    ///
    /// let config = Config {
    ///     source: PathBuf::from("/home/me/Downloads"),
    ///     default_target: PathBuf::from("/home/me/Sorted"),
    ///     suffix_filter: None,
    ///     rules: vec![Rule::new("invoice").with_folder("invoices")],
    ///     recursive: false,
    /// };
    /// OutputFormatter::rule_table(&config);
    /// ```
    pub fn rule_table(config: &Config) {
        Self::header("CONFIGURATION");
        println!("{:<8} {}", "Source".bold(), config.source.display());
        println!("{:<8} {}", "Target".bold(), config.default_target.display());
        if config.recursive {
            println!("{:<8} {}", "Mode".bold(), "recursive");
        }

        if let Some(filter) = &config.suffix_filter {
            if filter.has_excludes() {
                let excludes: Vec<&str> = filter.excludes().collect();
                println!("{:<8} {}", "Exclude".bold(), excludes.join(" "));
            }
            if filter.has_includes() {
                let includes: Vec<&str> = filter.includes().collect();
                println!("{:<8} {}", "Include".bold(), includes.join(" "));
            }
        }

        Self::header("RULES");
        if config.rules.is_empty() {
            Self::warning("No rules configured, files will stay in place");
            return;
        }

        let width = config
            .rules
            .iter()
            .map(|rule| rule.keyword.len() + 2)
            .max()
            .unwrap_or(0)
            .max(7); // At least "Keyword" width

        println!(
            "{:>3}  {:<width$} | {}",
            "#",
            "Keyword".bold(),
            "Destination".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 20));
        for (index, rule) in config.rules.iter().enumerate() {
            println!("{}", Self::rule_row(index + 1, rule, width));
        }
    }

    /// One formatted line of the rule table.
    pub fn rule_row(position: usize, rule: &Rule, width: usize) -> String {
        let keyword = if rule.is_matchable() {
            format!("'{}'", rule.keyword)
        } else {
            "(none)".to_string()
        };
        let destination = match (&rule.target, &rule.folder) {
            (Some(target), _) => target.display().to_string(),
            (None, Some(folder)) => format!("<target>/{}", folder.display()),
            (None, None) => "<target>".to_string(),
        };
        let line = format!("{position:>3}  {keyword:<width$} | {destination}");
        if rule.is_matchable() {
            line
        } else {
            format!("{} {}", line.dimmed(), "(never matches)".yellow())
        }
    }

    /// Prints what would happen to `file_name`.
    pub fn decision(file_name: &str, decision: &Decision<'_>) {
        println!("{}", Self::decision_line(file_name, decision));
    }

    pub fn decision_line(file_name: &str, decision: &Decision<'_>) -> String {
        match decision {
            Decision::Filtered => format!("{} {} (suffix filter)", file_name, "skipped".yellow()),
            Decision::Unmatched => format!("{} {} (no rule)", file_name, "stays".cyan()),
            Decision::Matched {
                rule,
                destination_dir,
            } => format!(
                "{} {} {} (keyword '{}')",
                file_name,
                "->".green(),
                destination_dir.display(),
                rule.keyword
            ),
        }
    }
}
