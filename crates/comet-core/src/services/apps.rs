use freedesktop_desktop_entry::DesktopEntry;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{FuzzyRanker, LazyIndex};
use crate::entry::Entry;
use crate::provider::Provider;

/// Field codes a launcher may drop from an `Exec` line.
const FIELD_CODES: [&str; 13] = [
    "%f", "%F", "%u", "%U", "%i", "%c", "%k", "%d", "%D", "%n", "%N", "%v", "%m",
];

/// An installed application parsed from a `.desktop` file.
#[derive(Debug, Clone)]
pub struct AppEntry {
    /// File stem of the desktop file, unique across the index.
    pub id: String,
    pub name: String,
    pub exec: String,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
}

impl AppEntry {
    /// Parse one desktop file; hidden and `NoDisplay` entries are skipped.
    pub fn from_desktop_file(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        let desktop = DesktopEntry::from_str(path, &content, Some(&["en"])).ok()?;
        if desktop.no_display() || desktop.hidden() {
            return None;
        }

        let no_locale: &[&str] = &[];
        let name = desktop.name(no_locale)?.to_string();
        let keywords = desktop
            .keywords(no_locale)
            .into_iter()
            .flatten()
            .map(|kw| kw.to_string())
            .chain(name.split_whitespace().map(str::to_lowercase))
            .collect();

        Some(Self {
            id: path.file_stem()?.to_string_lossy().into_owned(),
            exec: desktop.exec()?.to_string(),
            icon: desktop.icon().map(str::to_string),
            description: desktop.comment(no_locale).map(|c| c.to_string()),
            name,
            keywords,
        })
    }

    /// The `Exec` line without field codes, `%%` unescaped.
    pub fn command(&self) -> String {
        self.exec
            .split_whitespace()
            .filter(|token| !FIELD_CODES.contains(token))
            .map(|token| token.replace("%%", "%"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_entry(&self) -> Entry {
        Entry::new(self.name.clone(), self.command())
            .with_comment(self.description.clone().unwrap_or_default())
            .with_icon(self.icon.clone().unwrap_or_default())
            .with_category("app")
    }
}

/// Application-index search over the XDG application directories.
pub struct AppsProvider {
    dirs: Vec<PathBuf>,
    index: LazyIndex<AppEntry>,
    ranker: FuzzyRanker,
    triggers: Vec<String>,
}

impl AppsProvider {
    pub const NAME: &'static str = "apps";

    pub fn new(max_results: usize) -> Self {
        Self::with_dirs(default_app_dirs(), max_results)
    }

    pub fn with_dirs(dirs: Vec<PathBuf>, max_results: usize) -> Self {
        Self {
            dirs,
            index: LazyIndex::new(),
            ranker: FuzzyRanker::new(max_results),
            triggers: vec![":apps".to_string()],
        }
    }

    /// Desktop files from every directory, first id wins, sorted by name.
    fn build_index(dirs: &[PathBuf]) -> Vec<AppEntry> {
        let mut ids = HashSet::new();
        let mut apps: Vec<AppEntry> = dirs
            .iter()
            .filter(|dir| dir.is_dir())
            .flat_map(|dir| WalkDir::new(dir).max_depth(2).into_iter().flatten())
            .filter(|file| file.path().extension().is_some_and(|ext| ext == "desktop"))
            .filter_map(|file| AppEntry::from_desktop_file(file.path()))
            .filter(|app| ids.insert(app.id.clone()))
            .collect();

        apps.sort_by_cached_key(|app| app.name.to_lowercase());
        tracing::info!("Indexed {} applications", apps.len());
        apps
    }

    /// Apps ranked by the best of name, keyword and half the description score.
    pub fn search(&self, query: &str) -> Vec<AppEntry> {
        self.index.with(
            || Self::build_index(&self.dirs),
            |apps| {
                self.ranker.rank(
                    apps,
                    query,
                    |app| app.name.as_str(),
                    |app, q| {
                        let name = self.ranker.score(&app.name, q);
                        let keyword = app
                            .keywords
                            .iter()
                            .filter_map(|kw| self.ranker.score(kw, q))
                            .max();
                        let description = app
                            .description
                            .as_deref()
                            .and_then(|d| self.ranker.score(d, q))
                            .map(|s| s / 2);
                        name.max(keyword).max(description)
                    },
                )
            },
        )
    }
}

impl Provider for AppsProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn triggers(&self) -> &[String] {
        &self.triggers
    }

    fn help(&self) -> Entry {
        Entry::new("Applications", ":apps")
            .with_comment("Search installed applications (:apps)")
            .with_icon("system-search")
            .with_category("help")
    }

    fn query(&self, term: &str) -> Vec<Entry> {
        self.search(term).iter().map(AppEntry::to_entry).collect()
    }
}

/// Standard XDG application directories plus Flatpak and Snap exports.
pub fn default_app_dirs() -> Vec<PathBuf> {
    let mut dirs_to_scan: Vec<PathBuf> = vec![
        PathBuf::from("/usr/share/applications"),
        PathBuf::from("/usr/local/share/applications"),
    ];

    if let Some(data_home) = dirs::data_local_dir() {
        dirs_to_scan.push(data_home.join("applications"));
    }

    if let Some(home) = dirs::home_dir() {
        dirs_to_scan.push(home.join(".local/share/flatpak/exports/share/applications"));
    }

    dirs_to_scan.push(PathBuf::from("/var/lib/snapd/desktop/applications"));
    dirs_to_scan
}
