//! Known-hosts file materialization
//!
//! Key-pair authentication expects `~/.ssh/known_hosts` to exist so the
//! identity registration matches a stock OpenSSH setup; the file is
//! created empty (with its parent directory) when missing. Host keys are
//! not verified against it, see [`crate::ssh::ClientHandler`].

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SyncError;

/// Per-user known-hosts location: `~/.ssh/known_hosts`.
pub fn known_hosts_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts"))
}

/// Make sure the per-user known-hosts file exists, creating it (and
/// `~/.ssh`) when missing. Returns the path.
pub async fn ensure_known_hosts() -> Result<PathBuf, SyncError> {
    let path = known_hosts_path().ok_or_else(|| {
        SyncError::KeyError("could not determine the user home directory".to_string())
    })?;
    ensure_file(&path).await.map_err(|e| {
        SyncError::KeyError(format!(
            "could not identify nor create the SSH known hosts file at {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(path)
}

async fn ensure_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    debug!("Created empty known hosts file at {}", path.display());
    Ok(())
}
