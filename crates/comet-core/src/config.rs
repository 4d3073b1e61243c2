use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CometResult;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub history: HistoryConfig,
    pub plugins: PluginsConfig,
    pub apps: AppsConfig,
    pub executables: ExecutablesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub max_results: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Overrides the default `<cache dir>/comet/history`.
    pub path: Option<String>,
}

/// `[plugins]` section.
///
/// Any sub-table other than the named fields is that module's settings. Keys
/// that are not tables are logged and ignored, e.g.
///
/// ```toml
/// [plugins]
/// load = ["calc"]
///
/// [plugins.calc]
/// precision = 4
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PluginsConfig {
    /// Module names to load, in load (and trigger precedence) order.
    pub load: Vec<String>,
    /// Extra search directory tried before the default ones.
    pub directory: Option<String>,
    #[serde(flatten)]
    pub settings: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppsConfig {
    /// Directories holding `.desktop` files. Empty means the XDG defaults.
    pub directories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutablesConfig {
    pub enabled: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { max_results: 10 }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl Default for ExecutablesConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
            })
            .join("comet")
            .join("config.toml")
    }

    /// Shared data directory handed to modules.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".local/share"))
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
            })
            .join("comet")
    }

    /// Load config from the default path, or return defaults if not found
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`. Missing or broken files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut config = if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match Self::from_toml_str(&content) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config {}: {}", path.display(), e);
                    Self::default()
                }
            }
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.validate();
        config
    }

    pub fn from_toml_str(content: &str) -> CometResult<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.validate();
        Ok(config)
    }

    /// Validate and clamp config values to acceptable ranges
    fn validate(&mut self) {
        self.general.max_results = self.general.max_results.clamp(1, 50);

        let before = self.plugins.load.len();
        let mut seen = std::collections::HashSet::new();
        self.plugins.load.retain(|name| seen.insert(name.clone()));
        if self.plugins.load.len() != before {
            tracing::warn!("Duplicate module names in plugins.load were ignored");
        }

        self.plugins.settings.retain(|key, value| {
            let is_table = value.is_table();
            if !is_table {
                tracing::warn!("Ignoring plugins.{}: module settings must be a table", key);
            }
            is_table
        });

        let reserved = self
            .plugins
            .load
            .iter()
            .filter(|name| RESERVED_PLUGIN_KEYS.contains(&name.as_str()));
        for name in reserved {
            tracing::warn!("Module {} cannot be configured: plugins.{} is a loader setting", name, name);
        }
    }

    /// Resolved history file location.
    pub fn history_path(&self) -> PathBuf {
        match &self.history.path {
            Some(path) => expand_path(path),
            None => dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("comet")
                .join("history"),
        }
    }

    pub fn plugin_dir(&self) -> Option<PathBuf> {
        self.plugins.directory.as_deref().map(expand_path)
    }

    pub fn app_dirs(&self) -> Vec<PathBuf> {
        self.apps.directories.iter().map(|d| expand_path(d)).collect()
    }

    /// Settings scoped to one module, keyed by bare key.
    ///
    /// Strings are returned verbatim; other TOML values in their TOML form.
    pub fn module_settings(&self, module: &str) -> BTreeMap<String, String> {
        self.plugins
            .settings
            .get(module)
            .map(|table| {
                table
                    .as_table()
                    .into_iter()
                    .flatten()
                    .map(|(key, value)| {
                        let value = match value {
                            toml::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (key.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up a merged `<module>.<key>` setting.
    pub fn setting(&self, dotted: &str) -> Option<String> {
        let (module, key) = dotted.split_once('.')?;
        self.module_settings(module).remove(key)
    }
}

/// `[plugins]` keys owned by the loader rather than a module.
const RESERVED_PLUGIN_KEYS: [&str; 2] = ["load", "directory"];

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
