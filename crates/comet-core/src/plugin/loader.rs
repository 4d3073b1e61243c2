//! Discovery and loading of native extension modules.

use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::path::{Path, PathBuf};

use comet_abi::{EntryFn, PluginTable, ABI_VERSION, ENTRY_SYMBOL};
use libloading::Library;

use crate::config::Config;
use crate::error::{CometError, CometResult};

/// Environment variable naming a directory searched before all others.
pub const PLUGIN_DIR_ENV: &str = "COMET_PLUGIN_DIR";

/// A module resident in the process with a validated capability table.
///
/// The library stays loaded for as long as this value (or the adapter it is
/// moved into) lives.
pub struct LoadedModule {
    name: String,
    path: PathBuf,
    table: *const PluginTable,
    abi_version: u32,
    flags: u32,
    library: Library,
}

impl LoadedModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn abi_version(&self) -> u32 {
        self.abi_version
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub(crate) fn into_parts(self) -> (String, *const PluginTable, Library) {
        (self.name, self.table, self.library)
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("abi_version", &self.abi_version)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Finds module files across an ordered list of directories.
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    search_dirs: Vec<PathBuf>,
}

impl ModuleLoader {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Loader over [`default_search_dirs`] with no configured directory.
    pub fn with_default_dirs() -> Self {
        Self::new(default_search_dirs(None))
    }

    /// Loader over the default directories plus `plugins.directory` from config.
    pub fn from_config(config: &Config) -> Self {
        Self::new(default_search_dirs(config.plugin_dir()))
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// First module file for `name` that exists, in search order.
    ///
    /// Each directory is tried for `<name>.<ext>`, then for the platform
    /// library name cargo gives a `cdylib` (`lib<name>.so` on Linux).
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        let candidates = module_file_names(name);
        self.search_dirs
            .iter()
            .flat_map(|dir| candidates.iter().map(move |file| dir.join(file)))
            .find(|path| path.is_file())
    }

    /// Find and load the module called `name`.
    ///
    /// Every failure is logged and returned; nothing here aborts the host.
    pub fn load(&self, name: &str) -> CometResult<LoadedModule> {
        let result = validate_module_name(name).and_then(|()| {
            let path = self
                .find(name)
                .ok_or_else(|| CometError::ModuleNotFound(name.to_string()))?;
            load_module(name, &path)
        });

        match &result {
            Ok(module) => tracing::info!(
                "Loaded module {} from {} (flags {:#x})",
                name,
                module.path.display(),
                module.flags
            ),
            Err(e) => tracing::warn!("Skipping module {}: {}", name, e),
        }
        result
    }

    /// Load an explicit module file; its name is the file stem.
    pub fn load_path(&self, path: &Path) -> CometResult<LoadedModule> {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = validate_module_name(&name).and_then(|()| load_module(&name, path));
        if let Err(e) = &result {
            tracing::warn!("Skipping module {}: {}", path.display(), e);
        }
        result
    }
}

/// Search order: `$COMET_PLUGIN_DIR`, the configured directory, the dev build
/// directory (debug builds only), the user data directory, then the system
/// directories.
pub fn default_search_dirs(configured: Option<PathBuf>) -> Vec<PathBuf> {
    let mut dirs_to_search = Vec::new();

    if let Some(dir) = std::env::var_os(PLUGIN_DIR_ENV).filter(|d| !d.is_empty()) {
        dirs_to_search.push(PathBuf::from(dir));
    }

    dirs_to_search.extend(configured);

    if cfg!(debug_assertions) {
        dirs_to_search.push(PathBuf::from("target/debug"));
    }

    if let Some(data_dir) = dirs::data_dir() {
        dirs_to_search.push(data_dir.join("comet").join("plugins"));
    }

    dirs_to_search.push(PathBuf::from("/usr/local/lib/comet/plugins"));
    dirs_to_search.push(PathBuf::from("/usr/lib/comet/plugins"));

    dirs_to_search
}

pub fn module_file_name(name: &str) -> String {
    format!("{}.{}", name, DLL_EXTENSION)
}

/// File names accepted for module `name`, preferred first.
pub fn module_file_names(name: &str) -> Vec<String> {
    let mut names = vec![module_file_name(name)];
    if !DLL_PREFIX.is_empty() {
        names.push(format!("{}{}", DLL_PREFIX, module_file_name(name)));
    }
    names
}

/// A module name is a bare identifier: no separators, no `..`, no leading dot.
pub fn validate_module_name(name: &str) -> CometResult<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');

    if invalid {
        Err(CometError::InvalidModuleName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Open `path`, resolve the entry symbol and validate the table it returns.
pub fn load_module(name: &str, path: &Path) -> CometResult<LoadedModule> {
    // SAFETY: modules are trusted native code; running their initializers is
    // the point of loading them.
    let library = unsafe { Library::new(path) }.map_err(|e| CometError::ModuleLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let entry: EntryFn = {
        // SAFETY: the entry symbol's signature is fixed by the ABI.
        let symbol = unsafe { library.get::<EntryFn>(ENTRY_SYMBOL) }.map_err(|e| {
            CometError::ModuleLoad {
                path: path.to_path_buf(),
                reason: format!("missing entry symbol: {}", e),
            }
        })?;
        *symbol
    };

    // SAFETY: calling the module's exported entry point.
    let table = unsafe { entry() };
    // SAFETY: the library that owns the table is still loaded.
    let (abi_version, flags) = unsafe { validate_table(path, table) }?;

    Ok(LoadedModule {
        name: name.to_string(),
        path: path.to_path_buf(),
        table,
        abi_version,
        flags,
        library,
    })
}

/// Check a table pointer returned by an entry function.
///
/// # Safety
/// A non-null `table` must point to a readable `PluginTable`.
pub(crate) unsafe fn validate_table(
    path: &Path,
    table: *const PluginTable,
) -> CometResult<(u32, u32)> {
    if table.is_null() {
        return Err(CometError::NullTable(path.to_path_buf()));
    }
    let table = &*table;
    if table.abi_version != ABI_VERSION {
        return Err(CometError::IncompatibleVersion {
            path: path.to_path_buf(),
            found: table.abi_version,
            expected: ABI_VERSION,
        });
    }
    Ok((table.abi_version, table.flags))
}
