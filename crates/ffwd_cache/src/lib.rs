//! Fast-forward decision engine for multi-module builds.
//!
//! This crate records, per module, the state a build produced and the units of
//! work that ran, and decides on the next invocation whether each unit can be
//! skipped because nothing relevant changed. Recorded outputs are kept in a
//! single archive so fast-forwarded modules can get them back.

#![warn(missing_docs)]

pub mod archive;
pub mod config_tree;
pub mod error;
pub mod execution;
pub mod fingerprint;
pub mod hasher;
pub mod invalidation;
pub mod matcher;
pub mod reactor;
pub mod session;
pub mod snapshot;
pub mod state;

pub use archive::{ArchiveStore, ArchiveSummary};
pub use config_tree::{ConfigNode, ConfigTree, NodeId, TreeSource};
pub use error::CacheError;
pub use execution::{ExecutionEntry, ExecutionKey};
pub use fingerprint::{compare, Comparison, Mismatch, MismatchKind};
pub use invalidation::{
    DirtyReason, ExecutionDecision, ExecutionVerdict, InvalidationEngine, ModuleStatus,
    ModuleVerdict,
};
pub use matcher::{matches, ExecutionFilter, GlobPattern};
pub use reactor::Reactor;
pub use session::{BuildSession, CleanSummary, ReactorReport};
pub use snapshot::{ArtifactFile, ModuleSnapshot, ReactorSnapshot};
pub use state::{ArtifactDescriptor, ProjectState};
