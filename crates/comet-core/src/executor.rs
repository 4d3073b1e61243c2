use std::process::{Command, Stdio};

use crate::entry::Entry;
use crate::error::{CometError, CometResult};

/// Run the entry's command through `sh -c`, detached from our stdio.
///
/// The child is not waited on.
pub fn execute(entry: &Entry) -> CometResult<()> {
    let command = entry.command.trim();
    if command.is_empty() {
        return Err(CometError::Launch(format!(
            "{} has no command to run",
            entry.name
        )));
    }

    tracing::info!("Launching {}: {}", entry.name, command);

    Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| CometError::Launch(format!("Failed to launch {}: {}", entry.name, e)))?;

    Ok(())
}
