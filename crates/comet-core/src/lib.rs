pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod executor;
pub mod history;
pub mod plugin;
pub mod provider;
pub mod services;

pub use config::Config;
pub use engine::{ProviderInfo, SearchEngine, SearchResults};
pub use entry::Entry;
pub use error::{CometError, CometResult};
pub use executor::execute;
pub use history::History;
pub use plugin::{load_plugins, HostBinding, LoadedModule, ModuleLoader, PluginProvider};
pub use provider::{match_trigger, Provider};
pub use services::{AppsProvider, ExecutablesProvider};
