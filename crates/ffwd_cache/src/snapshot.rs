//! Host-supplied view of the reactor for one build invocation.
//!
//! A [`ReactorSnapshot`] lists every module with its base directory,
//! inter-module dependencies, properties, source files, produced artifacts,
//! and the ordered units of work of its build plan. It is usually read from a
//! `reactor.json` document written by the host build tool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ffwd_common::ModuleId;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::execution::ExecutionEntry;

/// A file produced by a module's build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Optional classifier distinguishing attached artifacts (`sources`, `tests`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// Packaging extension, e.g. `jar`.
    pub extension: String,
    /// Location of the file.
    pub path: PathBuf,
}

/// Current facts about one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    /// Module coordinates.
    pub id: ModuleId,
    /// Module base directory.
    pub basedir: PathBuf,
    /// Declared dependencies. Ids outside the reactor are ignored.
    #[serde(default)]
    pub dependencies: Vec<ModuleId>,
    /// Effective build properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Main source files.
    #[serde(default)]
    pub main_sources: Vec<PathBuf>,
    /// Test source files.
    #[serde(default)]
    pub test_sources: Vec<PathBuf>,
    /// Primary artifact, if the module produces one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactFile>,
    /// Attached artifacts.
    #[serde(default)]
    pub attached_artifacts: Vec<ArtifactFile>,
    /// Units of work in build-plan order.
    #[serde(default)]
    pub executions: Vec<ExecutionEntry>,
}

impl ModuleSnapshot {
    /// Creates a snapshot with no sources, artifacts, or executions.
    pub fn new(id: ModuleId, basedir: impl Into<PathBuf>) -> Self {
        Self {
            id,
            basedir: basedir.into(),
            dependencies: Vec::new(),
            properties: BTreeMap::new(),
            main_sources: Vec::new(),
            test_sources: Vec::new(),
            artifact: None,
            attached_artifacts: Vec::new(),
            executions: Vec::new(),
        }
    }

    /// Makes every path absolute: the base directory against `root`, files
    /// against the base directory.
    pub fn resolve_paths(&mut self, root: &Path) {
        self.basedir = root.join(&self.basedir);
        let base = self.basedir.clone();
        for file in self.main_sources.iter_mut().chain(self.test_sources.iter_mut()) {
            *file = base.join(&*file);
        }
        for artifact in self.artifact.iter_mut().chain(self.attached_artifacts.iter_mut()) {
            artifact.path = base.join(&artifact.path);
        }
    }

    /// All produced files, primary artifact first.
    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactFile> {
        self.artifact.iter().chain(self.attached_artifacts.iter())
    }
}

/// Every module of one build invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReactorSnapshot {
    /// Build root. Relative roots are taken from the document's directory;
    /// when absent, the document's directory is the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Modules in declaration order.
    #[serde(default)]
    pub modules: Vec<ModuleSnapshot>,
}

impl ReactorSnapshot {
    /// Reads a snapshot document and resolves every path in it.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let content = std::fs::read_to_string(path).map_err(|e| CacheError::io(path, e))?;
        let mut snapshot = Self::from_json(&content)?;
        let doc_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let root = match &snapshot.root {
            Some(root) => doc_dir.join(root),
            None => doc_dir.to_path_buf(),
        };
        snapshot.resolve_paths(&root);
        Ok(snapshot)
    }

    /// Parses a snapshot without touching the filesystem.
    pub fn from_json(content: &str) -> Result<Self, CacheError> {
        serde_json::from_str(content).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Sets the root and resolves every module against it.
    pub fn resolve_paths(&mut self, root: &Path) {
        for module in &mut self.modules {
            module.resolve_paths(root);
        }
        self.root = Some(root.to_path_buf());
    }

    /// The build root, or `.` when it was never set.
    pub fn root(&self) -> &Path {
        self.root.as_deref().unwrap_or_else(|| Path::new("."))
    }
}
