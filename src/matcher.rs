//! Keyword rule matching.

use crate::config::Rule;

/// Returns the first rule, in declared order, whose keyword occurs in `file_name`.
///
/// Matching is plain case-sensitive substring containment. Rules with an
/// empty keyword are skipped. `None` means the file stays where it is.
pub fn match_rule<'a>(file_name: &str, rules: &'a [Rule]) -> Option<&'a Rule> {
    rules
        .iter()
        .find(|rule| rule.is_matchable() && file_name.contains(rule.keyword.as_str()))
}
