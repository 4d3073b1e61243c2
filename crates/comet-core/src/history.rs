//! Usage history used as a secondary ranking signal.
//!
//! Each executed command has a usage count. The table is read in full at
//! startup and rewritten in full after every increment. The backing file is a
//! private, line-oriented format with one record per command:
//!
//! ```text
//! <escaped command>
//! <count>
//! %%
//! ```
//!
//! Commands escape `\`, `%`, CR and LF with a backslash, so no command line can
//! be mistaken for the `%%` end-of-record marker.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{CometError, CometResult};

const RECORD_END: &str = "%%";

/// Persisted command → usage count table.
#[derive(Debug, Default)]
pub struct History {
    /// Map of normalized command to usage count.
    entries: HashMap<String, i64>,

    /// Path to the data file; `None` keeps history in memory only.
    path: Option<PathBuf>,

    enabled: bool,
}

impl History {
    /// Load history from `path`.
    ///
    /// Returns empty history if the file doesn't exist or can't be read.
    pub fn load(path: impl Into<PathBuf>, enabled: bool) -> Self {
        let path = path.into();
        let entries = if enabled {
            match fs::read_to_string(&path) {
                Ok(content) => parse(&content),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("No history at {}", path.display());
                    HashMap::new()
                }
                Err(e) => {
                    tracing::warn!("{} ({})", CometError::HistoryRead(e), path.display());
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Self {
            entries,
            path: Some(path),
            enabled,
        }
    }

    /// Load history from the location and toggle in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::load(config.history_path(), config.history.enabled)
    }

    /// History that never records or scores anything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Enabled history without a backing file.
    pub fn in_memory() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Stored usage count for `command`, or 0 if unknown or disabled.
    pub fn score(&self, command: &str) -> i64 {
        if !self.enabled {
            return 0;
        }
        self.entries.get(normalize(command)).copied().unwrap_or(0)
    }

    /// Record one use of `command` and rewrite the backing file.
    ///
    /// A write failure is logged; the new count is kept in memory only.
    pub fn increment(&mut self, command: &str) {
        if !self.enabled {
            return;
        }
        let command = normalize(command);
        if command.is_empty() {
            return;
        }

        let count = self.entries.entry(command.to_string()).or_insert(0);
        *count = count.saturating_add(1);

        if let Err(e) = self.save() {
            tracing::warn!("{}", e);
        }
    }

    /// Forget every record.
    pub fn reset(&mut self) {
        self.entries.clear();
        if let Err(e) = self.save() {
            tracing::warn!("{}", e);
        }
    }

    /// Write the whole table to disk, replacing the previous file atomically.
    pub fn save(&self) -> CometResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(CometError::HistoryWrite)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serialize(&self.entries)).map_err(CometError::HistoryWrite)?;
        fs::rename(&tmp, path).map_err(CometError::HistoryWrite)?;
        Ok(())
    }

    /// Get the number of tracked commands.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no tracked commands.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(command: &str) -> &str {
    command.trim()
}

fn parse(content: &str) -> HashMap<String, i64> {
    let mut entries = HashMap::new();
    let mut lines = content.lines();
    let mut dropped = 0usize;

    while let Some(command) = lines.next() {
        if command == RECORD_END {
            continue;
        }
        let Some(count) = lines.next() else {
            dropped += 1;
            break;
        };
        if count == RECORD_END {
            dropped += 1;
            continue;
        }
        match lines.next() {
            Some(RECORD_END) => {}
            Some(_) => {
                // Skip to the next marker and drop this record.
                dropped += 1;
                for line in lines.by_ref() {
                    if line == RECORD_END {
                        break;
                    }
                }
                continue;
            }
            None => {
                dropped += 1;
                break;
            }
        }

        let command = unescape(command);
        let command = normalize(&command);
        match count.trim().parse::<i64>() {
            Ok(n) if n > 0 && !command.is_empty() => {
                let total = entries.entry(command.to_string()).or_insert(0i64);
                *total = total.saturating_add(n);
            }
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!("Discarded {} malformed history records", dropped);
    }
    entries
}

fn serialize(entries: &HashMap<String, i64>) -> String {
    let mut records: Vec<(&String, &i64)> = entries.iter().filter(|(_, n)| **n > 0).collect();
    records.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut out = String::new();
    for (command, count) in records {
        out.push_str(&escape(command));
        out.push('\n');
        out.push_str(&count.to_string());
        out.push('\n');
        out.push_str(RECORD_END);
        out.push('\n');
    }
    out
}

fn escape(command: &str) -> String {
    let mut out = String::with_capacity(command.len());
    for c in command.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
