//! Loads the built `calc` cdylib through the host loader and adapter.

use std::collections::BTreeMap;
use std::path::PathBuf;

use comet_core::{HostBinding, ModuleLoader, PluginProvider, Provider};
use tempfile::TempDir;

/// Cargo puts the cdylib next to the test binary's `deps` directory.
fn build_dirs() -> Vec<PathBuf> {
    let exe = std::env::current_exe().expect("test binary path");
    exe.ancestors().skip(1).take(2).map(PathBuf::from).collect()
}

#[test]
fn test_load_query_and_unload_built_module() {
    let loader = ModuleLoader::new(build_dirs());
    if loader.find("calc").is_none() {
        eprintln!("calc cdylib not found in {:?}, skipping", loader.search_dirs());
        return;
    }

    let module = loader.load("calc").expect("calc loads");
    assert_eq!(module.abi_version(), comet_abi::ABI_VERSION);
    assert_eq!(module.flags() & comet_abi::FLAG_NO_HISTORY, comet_abi::FLAG_NO_HISTORY);

    let data = TempDir::new().unwrap();
    let mut settings = BTreeMap::new();
    settings.insert("precision".to_string(), "2".to_string());
    let provider = PluginProvider::new(module, HostBinding::new("calc", settings, data.path()));

    assert_eq!(provider.triggers(), [":calc".to_string(), "=".to_string()]);
    assert!(!provider.participates_in_history());
    assert_eq!(provider.help().name, "Calculator");

    let results = provider.query("1/3");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "0.33");
    assert_eq!(results[0].category, "calc");
    assert!(provider.query("not math").is_empty());

    drop(provider);
}
