//! Module validity decisions and their propagation through the reactor.
//!
//! A module is [`ModuleStatus::Valid`] only if caching is enabled for it, all
//! of its in-reactor dependencies are valid, its recorded state loads, its
//! properties and sources are unchanged, every cacheable unit of work in the
//! current plan has a recorded twin with an equal configuration, and its
//! recorded outputs are on disk (restoring them from the archive if needed).
//! Any failure makes it [`ModuleStatus::Dirty`].
//!
//! Reactor layers are evaluated in order; modules inside one layer are checked
//! in parallel on a bounded rayon pool.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use ffwd_common::ModuleId;
use ffwd_config::{resolve_module, FfwdConfig, ModuleSettings};
use rayon::prelude::*;
use serde::Serialize;

use crate::archive::ArchiveStore;
use crate::execution::ExecutionKey;
use crate::fingerprint::Comparison;
use crate::hasher::{ChangeSet, FileDescriptor, FileExcludes, SourceHasher};
use crate::matcher::ExecutionFilter;
use crate::reactor::Reactor;
use crate::snapshot::ModuleSnapshot;
use crate::state::ProjectState;

/// Cache state of a module within one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    /// Not evaluated yet.
    Unknown,
    /// Recorded state is current; the module can be fast-forwarded.
    Valid,
    /// The module must be built.
    Dirty,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModuleStatus::Unknown => "unknown",
            ModuleStatus::Valid => "valid",
            ModuleStatus::Dirty => "dirty",
        })
    }
}

/// Why a module is dirty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirtyReason {
    /// Caching is switched off for the module or the whole reactor.
    CacheDisabled,
    /// The module was never recorded.
    NoState,
    /// The recorded state could not be used.
    StateUnreadable {
        /// Description of the problem.
        reason: String,
    },
    /// The configured file excludes are invalid.
    InvalidExcludes {
        /// Description of the problem.
        reason: String,
    },
    /// An in-reactor dependency is dirty.
    DependencyDirty {
        /// The first dirty dependency.
        dependency: ModuleId,
    },
    /// The module's properties differ from the recorded ones.
    PropertiesChanged,
    /// Source files were added, modified, or deleted.
    SourcesChanged {
        /// Files not recorded before.
        new: usize,
        /// Files whose checksum or timestamp changed.
        modified: usize,
        /// Recorded files that are gone.
        deleted: usize,
    },
    /// A cacheable unit of work in the plan has no recorded twin.
    MissingExecution {
        /// Canonical reference of the unit of work.
        execution: String,
    },
    /// A unit of work's configuration differs from the recorded one.
    ConfigMismatch {
        /// Canonical reference of the unit of work.
        execution: String,
        /// Path of the first differing node.
        path: String,
    },
    /// A recorded output is missing or stale and archive loading is off.
    OutputMissing {
        /// Recorded path of the output.
        path: String,
    },
    /// Outputs could not be restored from the archive.
    ArchiveIncomplete {
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for DirtyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirtyReason::CacheDisabled => write!(f, "caching disabled"),
            DirtyReason::NoState => write!(f, "no recorded state"),
            DirtyReason::StateUnreadable { reason } => write!(f, "state unreadable: {reason}"),
            DirtyReason::InvalidExcludes { reason } => write!(f, "invalid excludes: {reason}"),
            DirtyReason::DependencyDirty { dependency } => {
                write!(f, "dependency {dependency} is dirty")
            }
            DirtyReason::PropertiesChanged => write!(f, "properties changed"),
            DirtyReason::SourcesChanged {
                new,
                modified,
                deleted,
            } => write!(
                f,
                "sources changed ({new} new, {modified} modified, {deleted} deleted)"
            ),
            DirtyReason::MissingExecution { execution } => {
                write!(f, "{execution} was not recorded")
            }
            DirtyReason::ConfigMismatch { execution, path } => {
                write!(f, "{execution} configuration differs at {path}")
            }
            DirtyReason::OutputMissing { path } => write!(f, "output {path} is missing"),
            DirtyReason::ArchiveIncomplete { reason } => write!(f, "restore failed: {reason}"),
        }
    }
}

/// Skip/run answer for one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionVerdict {
    /// The unit of work is fast-forwarded.
    Skip,
    /// The unit of work must run.
    Run,
}

/// Verdict for one unit of work in a module's plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionDecision {
    /// The unit of work.
    pub key: ExecutionKey,
    /// Whether it runs.
    pub verdict: ExecutionVerdict,
}

/// Outcome of evaluating one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleVerdict {
    /// The module.
    pub module: ModuleId,
    /// Valid or dirty.
    pub status: ModuleStatus,
    /// Why the module is dirty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DirtyReason>,
    /// Per-unit verdicts in plan order.
    pub executions: Vec<ExecutionDecision>,
    /// Outputs restored from the archive.
    pub restored: usize,
}

impl ModuleVerdict {
    /// `true` if the module can be fast-forwarded.
    pub fn is_valid(&self) -> bool {
        self.status == ModuleStatus::Valid
    }

    /// Verdict for `key`, if it is part of the plan.
    pub fn execution(&self, key: &ExecutionKey) -> Option<ExecutionVerdict> {
        self.executions
            .iter()
            .find(|d| &d.key == key)
            .map(|d| d.verdict)
    }

    /// Number of units of work that are skipped.
    pub fn skipped(&self) -> usize {
        self.executions
            .iter()
            .filter(|d| d.verdict == ExecutionVerdict::Skip)
            .count()
    }
}

/// Decides module validity for one build root and configuration.
pub struct InvalidationEngine<'a> {
    root: PathBuf,
    config: &'a FfwdConfig,
    filter: ExecutionFilter,
    archive: Option<&'a ArchiveStore>,
}

impl<'a> InvalidationEngine<'a> {
    /// Creates an engine without archive restore.
    pub fn new(root: &Path, config: &'a FfwdConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            filter: ExecutionFilter::from_config(&config.executions),
            archive: None,
        }
    }

    /// Enables restoring missing outputs from `archive` when the
    /// configuration allows archive loading.
    pub fn with_archive(mut self, archive: &'a ArchiveStore) -> Self {
        if self.config.archive.load {
            self.archive = Some(archive);
        }
        self
    }

    /// The compiled unit-of-work filter.
    pub fn filter(&self) -> &ExecutionFilter {
        &self.filter
    }

    /// Evaluates every module, layer by layer.
    pub fn evaluate(&self, reactor: &Reactor) -> Vec<ModuleVerdict> {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.cache.threads)
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!("falling back to the global thread pool: {e}");
                None
            }
        };

        let mut statuses: HashMap<ModuleId, ModuleStatus> = HashMap::with_capacity(reactor.len());
        let mut verdicts = Vec::with_capacity(reactor.len());
        for layer in reactor.layers() {
            let check_layer = || {
                layer
                    .par_iter()
                    .map(|module| {
                        let dirty = reactor
                            .dependencies(&module.id)
                            .into_iter()
                            .find(|dep| statuses.get(*dep) != Some(&ModuleStatus::Valid));
                        self.check_module(module, dirty)
                    })
                    .collect::<Vec<_>>()
            };
            let layer_verdicts = match &pool {
                Some(pool) => pool.install(check_layer),
                None => check_layer(),
            };
            for verdict in &layer_verdicts {
                statuses.insert(verdict.module.clone(), verdict.status);
            }
            verdicts.extend(layer_verdicts);
        }

        let valid = verdicts.iter().filter(|v| v.is_valid()).count();
        tracing::info!("{valid} of {} module(s) can be fast-forwarded", verdicts.len());
        verdicts
    }

    /// Evaluates one module given the first dirty dependency, if any.
    pub fn check_module(
        &self,
        module: &ModuleSnapshot,
        dirty_dependency: Option<&ModuleId>,
    ) -> ModuleVerdict {
        let verdict = match self.check(module, dirty_dependency) {
            Ok(restored) => ModuleVerdict {
                module: module.id.clone(),
                status: ModuleStatus::Valid,
                reason: None,
                executions: self.decide_executions(module, true),
                restored,
            },
            Err(reason) => ModuleVerdict {
                module: module.id.clone(),
                status: ModuleStatus::Dirty,
                reason: Some(reason),
                executions: self.decide_executions(module, false),
                restored: 0,
            },
        };
        match &verdict.reason {
            Some(reason) => tracing::debug!("{}: dirty: {reason}", verdict.module),
            None => tracing::debug!("{}: valid", verdict.module),
        }
        verdict
    }

    fn decide_executions(&self, module: &ModuleSnapshot, valid: bool) -> Vec<ExecutionDecision> {
        module
            .executions
            .iter()
            .map(|entry| {
                let verdict = if valid && self.filter.is_cacheable(&entry.reference()) {
                    ExecutionVerdict::Skip
                } else {
                    ExecutionVerdict::Run
                };
                ExecutionDecision {
                    key: entry.key().clone(),
                    verdict,
                }
            })
            .collect()
    }

    fn check(
        &self,
        module: &ModuleSnapshot,
        dirty_dependency: Option<&ModuleId>,
    ) -> Result<usize, DirtyReason> {
        let settings = resolve_module(self.config, &module.id);
        if !settings.enabled {
            return Err(DirtyReason::CacheDisabled);
        }
        if let Some(dependency) = dirty_dependency {
            return Err(DirtyReason::DependencyDirty {
                dependency: dependency.clone(),
            });
        }

        let state = match ProjectState::load(&module_state_dir(module, &settings)) {
            Ok(Some(state)) => state,
            Ok(None) => return Err(DirtyReason::NoState),
            Err(e) => {
                return Err(DirtyReason::StateUnreadable {
                    reason: e.to_string(),
                })
            }
        };
        if state.module != module.id {
            return Err(DirtyReason::StateUnreadable {
                reason: format!("state belongs to {}", state.module),
            });
        }
        if state.properties != module.properties {
            return Err(DirtyReason::PropertiesChanged);
        }

        let excludes =
            FileExcludes::new(&settings.excludes).map_err(|e| DirtyReason::InvalidExcludes {
                reason: e.to_string(),
            })?;
        let hasher = SourceHasher::new(&self.root, settings.checksums);
        let changes = self.source_changes(module, &state, &hasher, &excludes);
        if !changes.is_empty() {
            return Err(DirtyReason::SourcesChanged {
                new: changes.new_files.len(),
                modified: changes.modified_files.len(),
                deleted: changes.deleted_files.len(),
            });
        }

        for entry in &module.executions {
            let reference = entry.reference();
            if !self.filter.is_cacheable(&reference) {
                continue;
            }
            let Some(recorded) = state.execution(entry.key()) else {
                return Err(DirtyReason::MissingExecution {
                    execution: reference,
                });
            };
            if let Comparison::Different(mismatch) = recorded.compare(entry) {
                tracing::debug!("{}: {reference} configuration differs: {mismatch}", module.id);
                return Err(DirtyReason::ConfigMismatch {
                    execution: reference,
                    path: mismatch.path,
                });
            }
        }

        self.ensure_outputs(module, &state, &hasher)
    }

    fn source_changes(
        &self,
        module: &ModuleSnapshot,
        state: &ProjectState,
        hasher: &SourceHasher,
        excludes: &FileExcludes,
    ) -> ChangeSet {
        let base = &module.basedir;
        let main = hasher.describe_all(&module.main_sources, base, excludes);
        let test = hasher.describe_all(&module.test_sources, base, excludes);
        let mut changes = hasher.detect_changes(&main, &state.main_sources, base, excludes);
        let test_changes = hasher.detect_changes(&test, &state.test_sources, base, excludes);
        changes.new_files.extend(test_changes.new_files);
        changes.modified_files.extend(test_changes.modified_files);
        changes.deleted_files.extend(test_changes.deleted_files);
        changes.unchanged_files.extend(test_changes.unchanged_files);
        changes
    }

    fn ensure_outputs(
        &self,
        module: &ModuleSnapshot,
        state: &ProjectState,
        hasher: &SourceHasher,
    ) -> Result<usize, DirtyReason> {
        let recorded: Vec<PathBuf> = state
            .artifacts()
            .map(|a| a.file.resolve(&self.root))
            .collect();
        if let Some(unrecorded) = module
            .artifacts()
            .find(|declared| !recorded.contains(&declared.path))
        {
            return Err(DirtyReason::OutputMissing {
                path: unrecorded.path.display().to_string(),
            });
        }

        let stale: Vec<&FileDescriptor> = state
            .artifacts()
            .map(|a| &a.file)
            .filter(|recorded| {
                !matches!(
                    hasher.describe(&recorded.resolve(&self.root)),
                    Ok(current) if recorded.is_current(&current, hasher.checksums())
                )
            })
            .collect();
        let Some(first) = stale.first() else {
            return Ok(0);
        };
        let Some(archive) = self.archive else {
            return Err(DirtyReason::OutputMissing {
                path: first.path.clone(),
            });
        };
        let restored = archive
            .restore(&module.id, &stale)
            .map_err(|e| DirtyReason::ArchiveIncomplete {
                reason: e.to_string(),
            })?;
        tracing::info!("{}: restored {restored} output(s) from the archive", module.id);
        Ok(restored)
    }
}

/// State directory of a module: the configured directory under its base dir.
pub(crate) fn module_state_dir(module: &ModuleSnapshot, settings: &ModuleSettings) -> PathBuf {
    module.basedir.join(&settings.state_dir)
}
