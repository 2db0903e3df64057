//! High-level cache orchestrator for one build invocation.
//!
//! A [`BuildSession`] ties the reactor, the invalidation engine, per-module
//! state files, and the archive into the interface a host build tool talks
//! to: evaluate the reactor, ask per unit of work whether it can be skipped,
//! record modules after a real build, and archive the results.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ffwd_common::ModuleId;
use ffwd_config::{resolve_module, FfwdConfig};
use serde::Serialize;

use crate::archive::{ArchiveStore, ArchiveSummary};
use crate::error::CacheError;
use crate::execution::ExecutionKey;
use crate::hasher::{FileExcludes, SourceHasher};
use crate::invalidation::{
    module_state_dir, ExecutionVerdict, InvalidationEngine, ModuleStatus, ModuleVerdict,
};
use crate::reactor::Reactor;
use crate::snapshot::{ModuleSnapshot, ReactorSnapshot};
use crate::state::ProjectState;

/// Summary of a reactor evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactorReport {
    /// Per-module verdicts in dependency order.
    pub modules: Vec<ModuleVerdict>,
    /// Modules that can be fast-forwarded.
    pub fast_forwarded: usize,
    /// Modules that must be built.
    pub dirty: usize,
    /// Units of work that are skipped.
    pub executions_skipped: usize,
    /// Units of work that must run.
    pub executions_run: usize,
}

impl ReactorReport {
    fn new(modules: Vec<ModuleVerdict>) -> Self {
        let fast_forwarded = modules.iter().filter(|v| v.is_valid()).count();
        let executions_skipped: usize = modules.iter().map(|v| v.skipped()).sum();
        let executions_total: usize = modules.iter().map(|v| v.executions.len()).sum();
        Self {
            dirty: modules.len() - fast_forwarded,
            fast_forwarded,
            executions_skipped,
            executions_run: executions_total - executions_skipped,
            modules,
        }
    }
}

/// Outcome of [`BuildSession::clean`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanSummary {
    /// State files removed.
    pub states: usize,
    /// Whether an archive was removed.
    pub archive: bool,
}

/// Cache manager for one build invocation.
pub struct BuildSession {
    root: PathBuf,
    config: FfwdConfig,
    reactor: Reactor,
    archive: ArchiveStore,
    verdicts: HashMap<ModuleId, ModuleVerdict>,
}

impl BuildSession {
    /// Creates a session over `modules`, whose paths must already be resolved.
    ///
    /// Fails before anything is evaluated if the module graph has a cycle.
    pub fn new(
        root: &Path,
        config: FfwdConfig,
        modules: Vec<ModuleSnapshot>,
    ) -> Result<Self, CacheError> {
        let reactor = Reactor::new(modules)?;
        let archive = ArchiveStore::new(root.join(&config.archive.path), root);
        Ok(Self {
            root: root.to_path_buf(),
            config,
            reactor,
            archive,
            verdicts: HashMap::new(),
        })
    }

    /// Creates a session from a loaded reactor snapshot.
    pub fn from_snapshot(snapshot: ReactorSnapshot, config: FfwdConfig) -> Result<Self, CacheError> {
        let root = snapshot.root().to_path_buf();
        Self::new(&root, config, snapshot.modules)
    }

    /// The build root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The module graph.
    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    /// The archive store.
    pub fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    /// Evaluates every module and remembers the verdicts.
    pub fn evaluate(&mut self) -> ReactorReport {
        let engine = InvalidationEngine::new(&self.root, &self.config).with_archive(&self.archive);
        let verdicts = engine.evaluate(&self.reactor);
        self.verdicts = verdicts
            .iter()
            .map(|v| (v.module.clone(), v.clone()))
            .collect();
        ReactorReport::new(verdicts)
    }

    /// Current status of `module`; [`ModuleStatus::Unknown`] before evaluation.
    pub fn status(&self, module: &ModuleId) -> ModuleStatus {
        self.verdicts
            .get(module)
            .map_or(ModuleStatus::Unknown, |v| v.status)
    }

    /// The last verdict for `module`.
    pub fn verdict(&self, module: &ModuleId) -> Option<&ModuleVerdict> {
        self.verdicts.get(module)
    }

    /// `true` if the unit of work `key` of `module` can be fast-forwarded.
    ///
    /// Unevaluated modules and units outside the plan always run.
    pub fn should_skip(&self, module: &ModuleId, key: &ExecutionKey) -> bool {
        self.verdicts
            .get(module)
            .filter(|v| v.is_valid())
            .and_then(|v| v.execution(key))
            == Some(ExecutionVerdict::Skip)
    }

    /// Records `module` after a real build and marks it valid.
    ///
    /// Modules with caching disabled are left untouched.
    pub fn record_build(&mut self, module: &ModuleId) -> Result<(), CacheError> {
        let snapshot = self
            .reactor
            .module(module)
            .ok_or_else(|| CacheError::UnknownModule {
                module: module.clone(),
            })?;
        let settings = resolve_module(&self.config, module);
        if !settings.enabled {
            tracing::debug!("{module}: caching disabled, nothing recorded");
            return Ok(());
        }

        let hasher = SourceHasher::new(&self.root, settings.checksums);
        let excludes = FileExcludes::new(&settings.excludes)?;
        let state = ProjectState::capture(snapshot, &hasher, &excludes);
        state.save(&module_state_dir(snapshot, &settings))?;
        tracing::info!("{module}: recorded {} unit(s) of work", state.executions.len());

        let executions = self
            .verdicts
            .get(module)
            .map(|v| v.executions.clone())
            .unwrap_or_default();
        self.verdicts.insert(
            module.clone(),
            ModuleVerdict {
                module: module.clone(),
                status: ModuleStatus::Valid,
                reason: None,
                executions,
                restored: 0,
            },
        );
        Ok(())
    }

    /// Writes every valid module's recorded files to the archive.
    ///
    /// Returns `None` when archive saving is switched off.
    pub fn save_archive(&self) -> Result<Option<ArchiveSummary>, CacheError> {
        if !self.config.archive.save {
            return Ok(None);
        }
        let mut states = Vec::new();
        for module in self.reactor.modules() {
            if self.status(&module.id) != ModuleStatus::Valid {
                continue;
            }
            let settings = resolve_module(&self.config, &module.id);
            match ProjectState::load(&module_state_dir(module, &settings)) {
                Ok(Some(state)) => states.push(state),
                Ok(None) => tracing::warn!("{}: valid but no state on disk", module.id),
                Err(e) => tracing::warn!("{}: {e}", module.id),
            }
        }
        let refs: Vec<&ProjectState> = states.iter().collect();
        self.archive.save(&refs).map(Some)
    }

    /// Removes every module's state file and the archive.
    pub fn clean(&mut self) -> Result<CleanSummary, CacheError> {
        let mut summary = CleanSummary::default();
        for module in self.reactor.modules() {
            let settings = resolve_module(&self.config, &module.id);
            if ProjectState::remove(&module_state_dir(module, &settings))? {
                summary.states += 1;
            }
        }
        summary.archive = self.archive.remove()?;
        self.verdicts.clear();
        Ok(summary)
    }

    /// Verdicts in dependency order; unevaluated modules are omitted.
    pub fn report(&self) -> ReactorReport {
        let modules = self
            .reactor
            .modules()
            .filter_map(|m| self.verdicts.get(&m.id).cloned())
            .collect();
        ReactorReport::new(modules)
    }
}
