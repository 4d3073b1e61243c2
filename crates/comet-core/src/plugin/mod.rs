//! Native extension modules: discovery, loading and the ABI adapter.

pub mod adapter;
pub mod loader;

use std::fs;

pub use adapter::{HostBinding, PluginProvider};
pub use loader::{
    default_search_dirs, load_module, module_file_name, module_file_names, validate_module_name,
    LoadedModule, ModuleLoader, PLUGIN_DIR_ENV,
};

use crate::config::Config;

/// Load every module listed in `plugins.load`, in order.
///
/// Modules that fail to load are logged by the loader and left out; the
/// returned list only holds initialized providers.
pub fn load_plugins(config: &Config, loader: &ModuleLoader) -> Vec<PluginProvider> {
    let data_dir = Config::data_dir();
    let mut data_dir_ready = false;

    config
        .plugins
        .load
        .iter()
        .filter_map(|name| {
            let module = loader.load(name).ok()?;
            if !data_dir_ready {
                if let Err(e) = fs::create_dir_all(&data_dir) {
                    tracing::debug!("Could not create data dir {}: {}", data_dir.display(), e);
                }
                data_dir_ready = true;
            }
            let binding = HostBinding::new(name, config.module_settings(name), &data_dir);
            Some(PluginProvider::new(module, binding))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_failed_modules_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(module_file_name("junk")), b"garbage").unwrap();

        let config = Config::from_toml_str(
            r#"
            [plugins]
            load = ["missing", "junk", "../escape"]
            "#,
        )
        .unwrap();
        let loader = ModuleLoader::new(vec![dir.path().to_path_buf()]);

        assert!(load_plugins(&config, &loader).is_empty());
    }
}
