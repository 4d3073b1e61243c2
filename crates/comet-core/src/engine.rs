//! Query routing: triggers, the help listing, the untriggered fallback chain
//! and history ranking.

use std::collections::HashSet;

use serde::Serialize;

use crate::entry::Entry;
use crate::history::History;
use crate::provider::{match_trigger, Provider};
use crate::services::{AppsProvider, ExecutablesProvider};

/// Triggers reserved for the help listing.
pub const HELP_TRIGGERS: [&str; 2] = [":help", ":h"];

/// Default cap on returned entries.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// The outcome of one routed query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub entries: Vec<Entry>,
    /// Name of the provider that produced the entries; `None` for the help
    /// listing and for queries nothing answered.
    pub provider: Option<String>,
    pub participates_in_history: bool,
    /// The presentation layer must keep `entries` in the given order.
    pub preserve_order: bool,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A registered provider as listed by `comet --list`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub triggers: Vec<String>,
    pub builtin: bool,
}

/// Routes queries to built-in providers and loaded modules.
pub struct SearchEngine {
    builtins: Vec<Box<dyn Provider>>,
    plugins: Vec<Box<dyn Provider>>,
    history: History,
    fallback: Vec<String>,
    max_results: usize,
}

impl SearchEngine {
    /// Build an engine; `plugins` are kept in load order.
    ///
    /// Triggers claimed twice are reported here; the earlier claim keeps
    /// winning at query time.
    pub fn new(
        builtins: Vec<Box<dyn Provider>>,
        plugins: Vec<Box<dyn Provider>>,
        history: History,
    ) -> Self {
        let engine = Self {
            builtins,
            plugins,
            history,
            fallback: vec![
                AppsProvider::NAME.to_string(),
                ExecutablesProvider::NAME.to_string(),
            ],
            max_results: DEFAULT_MAX_RESULTS,
        };
        engine.warn_duplicate_triggers();
        engine
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    /// Every provider in routing order: modules first, then built-ins.
    pub fn providers(&self) -> Vec<ProviderInfo> {
        let plugins = self.plugins.iter().map(|p| (p, false));
        let builtins = self.builtins.iter().map(|p| (p, true));
        plugins
            .chain(builtins)
            .map(|(p, builtin)| ProviderInfo {
                name: p.name().to_string(),
                triggers: p.triggers().to_vec(),
                builtin,
            })
            .collect()
    }

    pub fn search(&self, query: &str) -> SearchResults {
        if query.is_empty() {
            return SearchResults::default();
        }

        if let Some((provider, term)) = Self::claim(&self.plugins, query) {
            tracing::debug!("Query routed to module {}", provider.name());
            return self.finish(provider, provider.query(term));
        }

        if let Some(filter) = HELP_TRIGGERS
            .iter()
            .find_map(|trigger| match_trigger(query, trigger))
        {
            return self.help_listing(filter);
        }

        if let Some((provider, term)) = Self::claim(&self.builtins, query) {
            tracing::debug!("Query routed to {}", provider.name());
            return self.finish(provider, provider.query(term));
        }

        for name in &self.fallback {
            let Some(provider) = self.builtin(name) else {
                continue;
            };
            let entries = provider.query(query);
            if !entries.is_empty() {
                return self.finish(provider, entries);
            }
        }

        SearchResults::default()
    }

    /// Count a launched entry towards the history of commands.
    pub fn record_selection(&mut self, results: &SearchResults, entry: &Entry) {
        if results.participates_in_history {
            self.history.increment(&entry.command);
        }
    }

    fn claim<'a, 'q>(
        providers: &'a [Box<dyn Provider>],
        query: &'q str,
    ) -> Option<(&'a dyn Provider, &'q str)> {
        providers.iter().find_map(|provider| {
            provider
                .triggers()
                .iter()
                .find_map(|trigger| match_trigger(query, trigger))
                .map(|term| (provider.as_ref(), term))
        })
    }

    fn builtin(&self, name: &str) -> Option<&dyn Provider> {
        self.builtins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    fn help_listing(&self, filter: &str) -> SearchResults {
        let entries = self
            .builtins
            .iter()
            .chain(self.plugins.iter())
            .map(|p| p.help())
            .filter(|entry| filter.is_empty() || entry.mentions(filter))
            .collect();

        SearchResults {
            entries,
            provider: None,
            participates_in_history: false,
            preserve_order: true,
        }
    }

    fn finish(&self, provider: &dyn Provider, mut entries: Vec<Entry>) -> SearchResults {
        let participates = provider.participates_in_history();
        let preserve_order = provider.disables_default_sort();

        if participates {
            for entry in &mut entries {
                entry.rank_score += self.history.score(&entry.command);
            }
        }
        if !preserve_order {
            entries.sort_by(|a, b| b.rank_score.cmp(&a.rank_score));
        }
        entries.truncate(self.max_results);

        SearchResults {
            entries,
            provider: Some(provider.name().to_string()),
            participates_in_history: participates,
            preserve_order,
        }
    }

    fn warn_duplicate_triggers(&self) {
        let mut claimed: HashSet<&str> = HashSet::new();
        let plugins = self.plugins.iter().map(|p| (p.name(), p.triggers()));
        let builtins = self.builtins.iter().map(|p| (p.name(), p.triggers()));

        for (name, triggers) in plugins {
            for trigger in triggers {
                if !claimed.insert(trigger.as_str()) {
                    tracing::warn!("Trigger {} of {} is already claimed", trigger, name);
                }
            }
        }
        for trigger in HELP_TRIGGERS {
            if !claimed.insert(trigger) {
                tracing::warn!("Trigger {} is reserved for help and claimed by a module", trigger);
            }
        }
        for (name, triggers) in builtins {
            for trigger in triggers {
                if !claimed.insert(trigger.as_str()) {
                    tracing::warn!("Trigger {} of {} is already claimed", trigger, name);
                }
            }
        }
    }
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("providers", &self.providers())
            .field("fallback", &self.fallback)
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::adapter::tests::{binding, ECHO};
    use crate::plugin::PluginProvider;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Calls(Rc<RefCell<Vec<String>>>);

    impl Calls {
        fn terms(&self) -> Vec<String> {
            self.0.borrow().clone()
        }

        fn count(&self) -> usize {
            self.0.borrow().len()
        }
    }

    struct Mock {
        name: String,
        triggers: Vec<String>,
        results: Vec<Entry>,
        calls: Calls,
        no_history: bool,
        no_sort: bool,
    }

    impl Mock {
        fn new(name: &str, triggers: &[&str], results: Vec<Entry>) -> Self {
            Self {
                name: name.to_string(),
                triggers: triggers.iter().map(|t| t.to_string()).collect(),
                results,
                calls: Calls::default(),
                no_history: false,
                no_sort: false,
            }
        }

        fn calls(&self) -> Calls {
            self.calls.clone()
        }

        fn boxed(self) -> Box<dyn Provider> {
            Box::new(self)
        }
    }

    impl Provider for Mock {
        fn name(&self) -> &str {
            &self.name
        }

        fn triggers(&self) -> &[String] {
            &self.triggers
        }

        fn help(&self) -> Entry {
            Entry::new(self.name.clone(), self.triggers.first().cloned().unwrap_or_default())
                .with_comment(format!("{} provider", self.name))
        }

        fn query(&self, term: &str) -> Vec<Entry> {
            self.calls.0.borrow_mut().push(term.to_string());
            self.results.clone()
        }

        fn participates_in_history(&self) -> bool {
            !self.no_history
        }

        fn disables_default_sort(&self) -> bool {
            self.no_sort
        }
    }

    fn entries(names: &[(&str, i64)]) -> Vec<Entry> {
        names
            .iter()
            .map(|(name, rank)| Entry::new(*name, *name).with_rank(*rank))
            .collect()
    }

    fn names(results: &SearchResults) -> Vec<&str> {
        results.entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_trigger_routes_to_single_owner() {
        let calc = Mock::new("calc", &[":calc"], entries(&[("4", 0)]));
        let apps = Mock::new("apps", &[":apps"], entries(&[("Firefox", 0)]));
        let (calc_calls, apps_calls) = (calc.calls(), apps.calls());
        let engine = SearchEngine::new(vec![apps.boxed()], vec![calc.boxed()], History::in_memory());

        let results = engine.search(":calc 2+2");
        assert_eq!(names(&results), vec!["4"]);
        assert_eq!(results.provider.as_deref(), Some("calc"));

        engine.search(":calc");
        assert_eq!(calc_calls.terms(), vec!["2+2", ""]);
        assert_eq!(apps_calls.count(), 0);
    }

    #[test]
    fn test_trigger_needs_space_separator() {
        let calc = Mock::new("calc", &[":calc"], entries(&[("4", 0)]));
        let apps = Mock::new("apps", &[], Vec::new());
        let calc_calls = calc.calls();
        let apps_calls = apps.calls();
        let engine = SearchEngine::new(vec![apps.boxed()], vec![calc.boxed()], History::in_memory());

        assert!(engine.search(":calcx").is_empty());
        assert_eq!(calc_calls.count(), 0);
        assert_eq!(apps_calls.terms(), vec![":calcx"]);
    }

    #[test]
    fn test_empty_query_queries_nothing() {
        let apps = Mock::new("apps", &[":apps"], entries(&[("Firefox", 0)]));
        let calc = Mock::new("calc", &[""], entries(&[("4", 0)]));
        let (apps_calls, calc_calls) = (apps.calls(), calc.calls());
        let engine = SearchEngine::new(vec![apps.boxed()], vec![calc.boxed()], History::in_memory());

        let results = engine.search("");
        assert!(results.is_empty());
        assert_eq!(results.provider, None);
        assert_eq!(apps_calls.count() + calc_calls.count(), 0);
    }

    #[test]
    fn test_fallback_prefers_apps() {
        let apps = Mock::new("apps", &[":apps"], entries(&[("Firefox", 0)]));
        let exes = Mock::new("executables", &[":run"], entries(&[("firefox", 0)]));
        let (apps_calls, exe_calls) = (apps.calls(), exes.calls());
        let engine = SearchEngine::new(vec![exes.boxed(), apps.boxed()], Vec::new(), History::in_memory());

        let results = engine.search("fire");
        assert_eq!(names(&results), vec!["Firefox"]);
        assert_eq!(results.provider.as_deref(), Some("apps"));
        assert_eq!(apps_calls.terms(), vec!["fire"]);
        assert_eq!(exe_calls.count(), 0);
    }

    #[test]
    fn test_fallback_to_executables_on_no_apps() {
        let apps = Mock::new("apps", &[":apps"], Vec::new());
        let exes = Mock::new("executables", &[":run"], entries(&[("fire-tool", 0)]));
        let exe_calls = exes.calls();
        let engine = SearchEngine::new(vec![apps.boxed(), exes.boxed()], Vec::new(), History::in_memory());

        let results = engine.search("fire");
        assert_eq!(names(&results), vec!["fire-tool"]);
        assert_eq!(results.provider.as_deref(), Some("executables"));
        assert_eq!(exe_calls.terms(), vec!["fire"]);
    }

    #[test]
    fn test_fallback_ignores_unlisted_builtins() {
        let other = Mock::new("emoji", &[":emoji"], entries(&[("smile", 0)]));
        let calls = other.calls();
        let engine = SearchEngine::new(vec![other.boxed()], Vec::new(), History::in_memory());

        let results = engine.search("smile");
        assert!(results.is_empty());
        assert_eq!(results.provider, None);
        assert_eq!(calls.count(), 0);
    }

    #[test]
    fn test_help_lists_builtins_then_modules() {
        let apps = Mock::new("apps", &[":apps"], Vec::new());
        let calc = Mock::new("calc", &[":calc"], Vec::new());
        let web = Mock::new("Web", &[":web"], Vec::new());
        let engine = SearchEngine::new(
            vec![apps.boxed()],
            vec![calc.boxed(), web.boxed()],
            History::in_memory(),
        );

        let results = engine.search(":help");
        assert_eq!(names(&results), vec!["apps", "calc", "Web"]);
        assert!(results.preserve_order);
        assert!(!results.participates_in_history);
        assert_eq!(names(&engine.search(":h")), vec!["apps", "calc", "Web"]);
    }

    #[test]
    fn test_help_filter_is_case_insensitive() {
        let apps = Mock::new("apps", &[":apps"], Vec::new());
        let calc = Mock::new("calc", &[":calc"], Vec::new());
        let web = Mock::new("Web", &[":web"], Vec::new());
        let engine = SearchEngine::new(
            vec![apps.boxed()],
            vec![calc.boxed(), web.boxed()],
            History::in_memory(),
        );

        assert_eq!(names(&engine.search(":help a")), vec!["apps", "calc"]);
        assert_eq!(names(&engine.search(":help WEB")), vec!["Web"]);
        assert!(engine.search(":help zzz").is_empty());
    }

    #[test]
    fn test_module_trigger_beats_help_and_builtins() {
        let shadow = Mock::new("shadow", &[":apps", ":h"], entries(&[("shadowed", 0)]));
        let apps = Mock::new("apps", &[":apps"], entries(&[("Firefox", 0)]));
        let apps_calls = apps.calls();
        let engine = SearchEngine::new(vec![apps.boxed()], vec![shadow.boxed()], History::in_memory());

        assert_eq!(names(&engine.search(":apps fire")), vec!["shadowed"]);
        assert_eq!(names(&engine.search(":h")), vec!["shadowed"]);
        assert_eq!(apps_calls.count(), 0);
    }

    #[test]
    fn test_first_registration_wins() {
        let first = Mock::new("first", &[":x"], entries(&[("one", 0)]));
        let second = Mock::new("second", &[":x"], entries(&[("two", 0)]));
        let second_calls = second.calls();
        let engine = SearchEngine::new(Vec::new(), vec![first.boxed(), second.boxed()], History::in_memory());

        assert_eq!(names(&engine.search(":x")), vec!["one"]);
        assert_eq!(second_calls.count(), 0);
    }

    #[test]
    fn test_results_sorted_by_rank_stably() {
        let calc = Mock::new(
            "calc",
            &[":calc"],
            entries(&[("low", 1), ("high-a", 5), ("high-b", 5), ("mid", 3)]),
        );
        let engine = SearchEngine::new(Vec::new(), vec![calc.boxed()], History::in_memory());

        let results = engine.search(":calc");
        assert_eq!(names(&results), vec!["high-a", "high-b", "mid", "low"]);
        assert!(!results.preserve_order);
    }

    #[test]
    fn test_no_sort_keeps_provider_order() {
        let mut calc = Mock::new("calc", &[":calc"], entries(&[("low", 1), ("high", 5)]));
        calc.no_sort = true;
        let engine = SearchEngine::new(Vec::new(), vec![calc.boxed()], History::in_memory());

        let results = engine.search(":calc");
        assert_eq!(names(&results), vec!["low", "high"]);
        assert!(results.preserve_order);
    }

    #[test]
    fn test_history_reorders_results() {
        let apps = Mock::new("apps", &[":apps"], entries(&[("gimp", 0), ("firefox", 0)]));
        let mut history = History::in_memory();
        history.increment("firefox");
        let engine = SearchEngine::new(vec![apps.boxed()], Vec::new(), history);

        let results = engine.search(":apps");
        assert_eq!(names(&results), vec!["firefox", "gimp"]);
        assert_eq!(results.entries[0].rank_score, 1);
    }

    #[test]
    fn test_no_history_provider_is_not_scored() {
        let mut calc = Mock::new("calc", &[":calc"], entries(&[("4", 0)]));
        calc.no_history = true;
        let mut history = History::in_memory();
        history.increment("4");
        let mut engine = SearchEngine::new(Vec::new(), vec![calc.boxed()], history);

        let results = engine.search(":calc 2+2");
        assert_eq!(results.entries[0].rank_score, 0);
        assert!(!results.participates_in_history);

        let entry = results.entries[0].clone();
        engine.record_selection(&results, &entry);
        assert_eq!(engine.history().score("4"), 1);
    }

    #[test]
    fn test_record_selection_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history");
        let apps = Mock::new("apps", &[":apps"], entries(&[("firefox", 0)]));
        let mut engine = SearchEngine::new(vec![apps.boxed()], Vec::new(), History::load(&path, true));

        let results = engine.search("fire");
        let entry = results.entries[0].clone();
        engine.record_selection(&results, &entry);
        engine.record_selection(&results, &entry);

        assert_eq!(History::load(&path, true).score("firefox"), 2);
    }

    #[test]
    fn test_results_are_truncated() {
        let apps = Mock::new("apps", &[":apps"], entries(&[("a", 3), ("b", 2), ("c", 1)]));
        let engine = SearchEngine::new(vec![apps.boxed()], Vec::new(), History::in_memory())
            .with_max_results(2);

        assert_eq!(names(&engine.search(":apps")), vec!["a", "b"]);
    }

    #[test]
    fn test_searches_are_deterministic() {
        let apps = Mock::new("apps", &[":apps"], entries(&[("b", 1), ("a", 1), ("c", 2)]));
        let engine = SearchEngine::new(vec![apps.boxed()], Vec::new(), History::in_memory());

        let first = names(&engine.search("x")).join(",");
        let second = names(&engine.search("x")).join(",");
        assert_eq!(first, "c,b,a");
        assert_eq!(first, second);
    }

    #[test]
    fn test_routes_through_module_adapter() {
        let echo = unsafe { PluginProvider::from_table("echo", &ECHO, binding("echo"), None) };
        let engine = SearchEngine::new(Vec::new(), vec![Box::new(echo)], History::in_memory());

        let results = engine.search(":e hi");
        assert_eq!(names(&results), vec!["hi-2", "hi-1", "hi-0"]);
        assert_eq!(results.entries[0].comment, "hello");
        assert_eq!(results.provider.as_deref(), Some("echo"));
    }

    #[test]
    fn test_providers_lists_modules_first() {
        let apps = Mock::new("apps", &[":apps"], Vec::new());
        let calc = Mock::new("calc", &[":calc"], Vec::new());
        let engine = SearchEngine::new(vec![apps.boxed()], vec![calc.boxed()], History::in_memory());

        let providers = engine.providers();
        assert_eq!(providers[0].name, "calc");
        assert!(!providers[0].builtin);
        assert_eq!(providers[1].triggers, vec![":apps"]);
        assert!(providers[1].builtin);
    }
}
