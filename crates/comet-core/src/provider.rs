//! The capability every result source implements.
//!
//! Built-in search modes and loaded extension modules both sit behind
//! [`Provider`], so the router iterates them uniformly.

use crate::entry::Entry;

/// A source of results that claims queries through trigger prefixes.
pub trait Provider {
    /// Unique name of this provider (e.g. "apps", "executables", a module name)
    fn name(&self) -> &str;

    /// Literal prefixes that route a query to this provider, in precedence order
    fn triggers(&self) -> &[String];

    /// A synthetic entry describing the provider for the `:help` listing
    fn help(&self) -> Entry;

    /// Results for `term`, best first
    fn query(&self, term: &str) -> Vec<Entry>;

    /// Whether usage history should bias this provider's results
    fn participates_in_history(&self) -> bool {
        true
    }

    /// Whether this provider's result order must be kept as returned
    fn disables_default_sort(&self) -> bool {
        false
    }
}

/// If `query` is claimed by `trigger`, return the remainder.
///
/// A query matches when it equals the trigger (remainder `""`) or starts with
/// the trigger followed by one space (remainder is everything after it).
/// Matching is case-sensitive; an empty trigger never matches.
pub fn match_trigger<'q>(query: &'q str, trigger: &str) -> Option<&'q str> {
    if trigger.is_empty() {
        return None;
    }
    let rest = query.strip_prefix(trigger)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix(' ')
    }
}
