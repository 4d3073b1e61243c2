use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in Comet
#[derive(Debug, Error)]
pub enum CometError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Invalid module name: {0:?}")]
    InvalidModuleName(String),

    #[error("Failed to load module {path}: {reason}")]
    ModuleLoad { path: PathBuf, reason: String },

    #[error("Module {path} declares ABI version {found}, expected {expected}")]
    IncompatibleVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("Module {0} returned a null capability table")]
    NullTable(PathBuf),

    #[error("Malformed result from module {module}: {reason}")]
    MalformedResult { module: String, reason: String },

    #[error("History read error: {0}")]
    HistoryRead(#[source] std::io::Error),

    #[error("History write error: {0}")]
    HistoryWrite(#[source] std::io::Error),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Comet operations
pub type CometResult<T> = Result<T, CometError>;

impl From<toml::de::Error> for CometError {
    fn from(err: toml::de::Error) -> Self {
        CometError::Config(err.to_string())
    }
}
