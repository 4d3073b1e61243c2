//! Built-in providers.

pub mod apps;
pub mod executables;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::sync::{PoisonError, RwLock};

pub use apps::{AppEntry, AppsProvider};
pub use executables::{Executable, ExecutablesProvider};

/// An index built on first use.
///
/// The first caller takes the write lock and builds; every later caller only
/// takes the read lock.
#[derive(Debug)]
pub(crate) struct LazyIndex<T> {
    slot: RwLock<Option<Vec<T>>>,
}

impl<T> LazyIndex<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    pub(crate) fn with<R>(&self, build: impl FnOnce() -> Vec<T>, f: impl FnOnce(&[T]) -> R) -> R {
        {
            let guard = self.slot.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(items) = guard.as_deref() {
                return f(items);
            }
        }

        let mut guard = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(build());
        }
        f(guard.as_deref().unwrap_or(&[]))
    }

    #[cfg(test)]
    pub(crate) fn is_built(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Score added when a candidate's name starts with the query.
const PREFIX_BOOST: i64 = 100;

/// Skim-based ranking shared by the built-in indexes.
pub(crate) struct FuzzyRanker {
    matcher: SkimMatcherV2,
    limit: usize,
}

impl FuzzyRanker {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            matcher: SkimMatcherV2::default(),
            limit,
        }
    }

    /// Case-insensitive fuzzy score of `query_lower` against `text`.
    pub(crate) fn score(&self, text: &str, query_lower: &str) -> Option<i64> {
        self.matcher.fuzzy_match(&text.to_lowercase(), query_lower)
    }

    /// The best `limit` items for `query`, best first; ties keep index order.
    ///
    /// `score` gets the lowercased query and drops an item by returning
    /// `None`. An empty query returns the head of the index unscored.
    pub(crate) fn rank<T: Clone>(
        &self,
        items: &[T],
        query: &str,
        name: impl Fn(&T) -> &str,
        score: impl Fn(&T, &str) -> Option<i64>,
    ) -> Vec<T> {
        if query.is_empty() {
            return items.iter().take(self.limit).cloned().collect();
        }

        let query_lower = query.to_lowercase();
        let mut scored: Vec<(i64, &T)> = items
            .iter()
            .filter_map(|item| {
                let base = score(item, &query_lower)?;
                let boost = if name(item).to_lowercase().starts_with(&query_lower) {
                    PREFIX_BOOST
                } else {
                    0
                };
                Some((base + boost, item))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(self.limit)
            .map(|(_, item)| item.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_ranker_boosts_prefix_and_caps() {
        let ranker = FuzzyRanker::new(2);
        let items = ["xfire", "firefox", "fireworks", "gimp"];
        let ranked = ranker.rank(&items, "fire", |s| s, |s, q| ranker.score(s, q));

        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|s| s.starts_with("fire")));
        assert_eq!(ranker.rank(&items, "", |s| s, |_, _| None), vec!["xfire", "firefox"]);
        assert!(ranker.rank(&items, "zzzz", |s| s, |s, q| ranker.score(s, q)).is_empty());
    }

    #[test]
    fn test_ranker_is_case_insensitive() {
        let ranker = FuzzyRanker::new(5);
        let items = ["Firefox"];
        assert_eq!(
            ranker.rank(&items, "FIRE", |s| s, |s, q| ranker.score(s, q)),
            vec!["Firefox"]
        );
    }

    #[test]
    fn test_builds_once() {
        let index = LazyIndex::new();
        let builds = Cell::new(0);
        let build = || {
            builds.set(builds.get() + 1);
            vec![1, 2, 3]
        };

        assert!(!index.is_built());
        assert_eq!(index.with(build, |items| items.len()), 3);
        assert!(index.is_built());
        assert_eq!(index.with(|| unreachable!(), |items| items[0]), 1);
        assert_eq!(builds.get(), 1);
    }
}
