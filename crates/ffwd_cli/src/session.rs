//! Shared session helpers for CLI commands.
//!
//! Every command starts the same way: read the reactor snapshot, load the
//! configuration that applies to its build root, and open a [`BuildSession`].

use std::path::{Path, PathBuf};

use ffwd_cache::{BuildSession, ReactorSnapshot};
use ffwd_config::FfwdConfig;

use crate::GlobalArgs;

/// Loads the configuration for a build root.
///
/// An explicit `--config` file must exist; otherwise `ffwd.toml` at the
/// build root is used when present, and the defaults when not.
pub fn load_config(
    root: &Path,
    global: &GlobalArgs,
) -> Result<FfwdConfig, Box<dyn std::error::Error>> {
    match global.config {
        Some(ref path) => {
            let path = PathBuf::from(path);
            let config = ffwd_config::load_config_file(&path)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            Ok(config)
        }
        None => Ok(ffwd_config::load_config_or_default(root)?),
    }
}

/// Opens a build session for the reactor snapshot at `reactor`.
pub fn open_session(
    reactor: &Path,
    global: &GlobalArgs,
) -> Result<BuildSession, Box<dyn std::error::Error>> {
    let snapshot = ReactorSnapshot::load(reactor)?;
    let config = load_config(snapshot.root(), global)?;
    tracing::debug!(
        "reactor {} with {} module(s) rooted at {}",
        reactor.display(),
        snapshot.modules.len(),
        snapshot.root().display()
    );
    Ok(BuildSession::from_snapshot(snapshot, config)?)
}
