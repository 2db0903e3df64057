//! Persisted per-module build state.
//!
//! A [`ProjectState`] is written as `state.json` in the module's state
//! directory after every real build and read back at the start of the next
//! one. It is never modified in place: a new build replaces the whole file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ffwd_common::ModuleId;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::execution::{ExecutionEntry, ExecutionKey};
use crate::hasher::{FileDescriptor, FileExcludes, SourceHasher};
use crate::snapshot::{ArtifactFile, ModuleSnapshot};

/// Name of the state file within a module's state directory.
pub const STATE_FILE: &str = "state.json";

/// Version written into every state file. A state from another version is
/// treated as unreadable.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Recorded facts about one produced artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Classifier of an attached artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// Packaging extension.
    pub extension: String,
    /// The file itself.
    pub file: FileDescriptor,
}

/// Everything recorded about one module after a real build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    /// Version of the tool that wrote this state.
    pub tool_version: String,
    /// The module this state belongs to.
    pub module: ModuleId,
    /// Effective build properties.
    pub properties: BTreeMap<String, String>,
    /// Main source descriptors, sorted by path.
    pub main_sources: Vec<FileDescriptor>,
    /// Test source descriptors, sorted by path.
    pub test_sources: Vec<FileDescriptor>,
    /// Primary artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactDescriptor>,
    /// Attached artifacts in declaration order.
    #[serde(default)]
    pub attached_artifacts: Vec<ArtifactDescriptor>,
    /// Units of work in the order they ran.
    pub executions: Vec<ExecutionEntry>,
}

impl ProjectState {
    /// Captures the state of a freshly built module.
    ///
    /// Sources matching `excludes` are left out. Artifacts that cannot be
    /// read are dropped with a warning.
    pub fn capture(
        snapshot: &ModuleSnapshot,
        hasher: &SourceHasher,
        excludes: &FileExcludes,
    ) -> Self {
        let base = &snapshot.basedir;
        let describe_artifact = |artifact: &ArtifactFile| {
            match hasher.describe(&artifact.path) {
                Ok(file) => Some(ArtifactDescriptor {
                    classifier: artifact.classifier.clone(),
                    extension: artifact.extension.clone(),
                    file,
                }),
                Err(e) => {
                    tracing::warn!("{}: not recording artifact: {e}", snapshot.id);
                    None
                }
            }
        };

        Self {
            tool_version: TOOL_VERSION.to_string(),
            module: snapshot.id.clone(),
            properties: snapshot.properties.clone(),
            main_sources: hasher.describe_all(&snapshot.main_sources, base, excludes),
            test_sources: hasher.describe_all(&snapshot.test_sources, base, excludes),
            artifact: snapshot.artifact.as_ref().and_then(describe_artifact),
            attached_artifacts: snapshot
                .attached_artifacts
                .iter()
                .filter_map(describe_artifact)
                .collect(),
            executions: snapshot.executions.clone(),
        }
    }

    /// Path of the state file inside `state_dir`.
    pub fn path(state_dir: &Path) -> PathBuf {
        state_dir.join(STATE_FILE)
    }

    /// Loads the state from `state_dir`.
    ///
    /// Returns `Ok(None)` when no state was ever written, and
    /// [`CacheError::StateUnreadable`] when the file exists but cannot be used.
    pub fn load(state_dir: &Path) -> Result<Option<Self>, CacheError> {
        let path = Self::path(state_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::StateUnreadable {
                    path,
                    reason: e.to_string(),
                })
            }
        };
        let state: Self =
            serde_json::from_str(&content).map_err(|e| CacheError::StateUnreadable {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if !state.is_compatible(TOOL_VERSION) {
            return Err(CacheError::StateUnreadable {
                path,
                reason: format!(
                    "written by version {}, current is {TOOL_VERSION}",
                    state.tool_version
                ),
            });
        }
        Ok(Some(state))
    }

    /// Writes the state to `state_dir`, replacing any previous file.
    ///
    /// The document goes to a temporary file first and is renamed into place.
    pub fn save(&self, state_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(state_dir).map_err(|e| CacheError::io(state_dir, e))?;
        let path = Self::path(state_dir);
        let tmp = state_dir.join(format!("{STATE_FILE}.tmp"));
        let mut json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        json.push('\n');
        std::fs::write(&tmp, json).map_err(|e| CacheError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| CacheError::io(&path, e))
    }

    /// Removes the state file. Returns `true` if one existed.
    pub fn remove(state_dir: &Path) -> Result<bool, CacheError> {
        let path = Self::path(state_dir);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Returns `true` if this state was written by `version`.
    pub fn is_compatible(&self, version: &str) -> bool {
        self.tool_version == version
    }

    /// The recorded entry for `key`. With duplicate keys the first one wins.
    pub fn execution(&self, key: &ExecutionKey) -> Option<&ExecutionEntry> {
        self.executions.iter().find(|e| e.key() == key)
    }

    /// Recorded artifacts, primary first.
    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactDescriptor> {
        self.artifact.iter().chain(self.attached_artifacts.iter())
    }

    /// Every recorded file: main sources, test sources, then artifacts.
    pub fn files(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.main_sources
            .iter()
            .chain(self.test_sources.iter())
            .chain(self.artifacts().map(|a| &a.file))
    }
}
