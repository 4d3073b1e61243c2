use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{FuzzyRanker, LazyIndex};
use crate::entry::Entry;
use crate::provider::Provider;

/// An executable file found on `$PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    pub name: String,
    pub path: PathBuf,
}

impl Executable {
    fn to_entry(&self) -> Entry {
        Entry::new(self.name.clone(), self.name.clone())
            .with_comment(self.path.display().to_string())
            .with_icon("application-x-executable")
            .with_category("bin")
    }
}

pub struct ExecutablesProvider {
    dirs: Vec<PathBuf>,
    index: LazyIndex<Executable>,
    ranker: FuzzyRanker,
    triggers: Vec<String>,
}

impl ExecutablesProvider {
    pub const NAME: &'static str = "executables";

    /// Provider over the directories in `$PATH`.
    pub fn new(max_results: usize) -> Self {
        Self::with_dirs(path_dirs(), max_results)
    }

    pub fn with_dirs(dirs: Vec<PathBuf>, max_results: usize) -> Self {
        Self {
            dirs,
            index: LazyIndex::new(),
            ranker: FuzzyRanker::new(max_results),
            triggers: vec![":run".to_string()],
        }
    }

    fn build_index(dirs: &[PathBuf]) -> Vec<Executable> {
        let mut seen = HashSet::new();
        let mut executables = Vec::new();

        for dir in dirs {
            for entry in WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if !entry.file_type().is_file() || !is_executable(entry.path()) {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if seen.insert(name.clone()) {
                    executables.push(Executable {
                        name,
                        path: entry.path().to_path_buf(),
                    });
                }
            }
        }

        executables.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::info!("Indexed {} executables", executables.len());
        executables
    }

    /// Executables ranked by file name.
    pub fn search(&self, query: &str) -> Vec<Executable> {
        self.index.with(
            || Self::build_index(&self.dirs),
            |executables| {
                self.ranker.rank(
                    executables,
                    query,
                    |exe| exe.name.as_str(),
                    |exe, q| self.ranker.score(&exe.name, q),
                )
            },
        )
    }
}

impl Provider for ExecutablesProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn triggers(&self) -> &[String] {
        &self.triggers
    }

    fn help(&self) -> Entry {
        Entry::new("Run", ":run")
            .with_comment("Run an executable from $PATH (:run)")
            .with_icon("utilities-terminal")
            .with_category("help")
    }

    fn query(&self, term: &str) -> Vec<Entry> {
        self.search(term).iter().map(Executable::to_entry).collect()
    }
}

fn path_dirs() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect())
        .unwrap_or_default()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "exe")
}
