//! Error types for cache operations.

use std::path::PathBuf;

use ffwd_common::ModuleId;

/// Errors that can occur during cache operations.
///
/// Most cache operations are fail-safe: errors demote a module to dirty
/// rather than failing the build. Only [`CacheError::CyclicDependency`] aborts
/// an evaluation pass.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A persisted state file is missing, corrupt, or from another tool version.
    #[error("unreadable state file {path}: {reason}")]
    StateUnreadable {
        /// The state file path.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// Configuration markup could not be parsed or written.
    #[error("invalid configuration markup: {reason}")]
    Markup {
        /// Description of the markup problem.
        reason: String,
    },

    /// A recorded tree digest does not match the decoded configuration.
    #[error("digest mismatch for {execution}: recorded {recorded}, decoded {actual}")]
    DigestMismatch {
        /// Canonical reference of the execution.
        execution: String,
        /// The digest stored alongside the configuration.
        recorded: String,
        /// The digest of the configuration as decoded.
        actual: String,
    },

    /// The module graph contains a cycle; propagation order is undefined.
    #[error("cyclic dependency involving module {module}")]
    CyclicDependency {
        /// A module on the cycle.
        module: ModuleId,
    },

    /// Two modules in one reactor share an id.
    #[error("duplicate module {module} in reactor")]
    DuplicateModule {
        /// The repeated id.
        module: ModuleId,
    },

    /// A module was referenced that is not part of the reactor.
    #[error("unknown module {module}")]
    UnknownModule {
        /// The missing id.
        module: ModuleId,
    },

    /// A file needed to fast-forward a module is absent from the archive.
    #[error("archive is missing {entry} for module {module}")]
    ArchiveIncomplete {
        /// The module being restored.
        module: ModuleId,
        /// The archive entry name that was expected.
        entry: String,
    },

    /// A recorded file no longer has the content it was recorded with.
    #[error("{path} changed since it was recorded")]
    FileChanged {
        /// Recorded path of the file.
        path: String,
    },

    /// A file exclude glob could not be compiled.
    #[error("invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern as configured.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = CacheError::io(
            "/tmp/core/target/ffwd/state.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("state.json"));
    }

    #[test]
    fn state_unreadable_display() {
        let err = CacheError::StateUnreadable {
            path: PathBuf::from("state.json"),
            reason: "unexpected EOF".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("unreadable state file"));
        assert!(msg.contains("unexpected EOF"));
    }

    #[test]
    fn cyclic_dependency_display() {
        let err = CacheError::CyclicDependency {
            module: ModuleId::new("com.acme", "core"),
        };
        assert_eq!(
            err.to_string(),
            "cyclic dependency involving module com.acme:core"
        );
    }

    #[test]
    fn archive_incomplete_display() {
        let err = CacheError::ArchiveIncomplete {
            module: ModuleId::new("com.acme", "core"),
            entry: "com.acme/core/root/target/core.jar".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("archive is missing"));
        assert!(msg.contains("core.jar"));
    }

    #[test]
    fn digest_mismatch_display() {
        let err = CacheError::DigestMismatch {
            execution: "g:a:1:compile@default".to_string(),
            recorded: "aabb".to_string(),
            actual: "ccdd".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aabb"));
        assert!(msg.contains("ccdd"));
    }
}
