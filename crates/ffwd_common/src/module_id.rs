//! Module identifiers of the form `group:artifact`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies one module of a reactor build.
///
/// The textual form is `group:artifact`. Versions are deliberately left out so
/// that a version bump of the whole reactor still finds the previous state.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId {
    group: String,
    artifact: String,
}

/// Error returned when a string is not a valid `group:artifact` pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid module id '{input}': expected 'group:artifact'")]
pub struct ParseModuleIdError {
    /// The rejected input.
    pub input: String,
}

impl ModuleId {
    /// Creates a module id from its group and artifact parts.
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
        }
    }

    /// Returns the group part.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns the artifact part.
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// Returns a path-safe prefix (`group/artifact`) used to address this
    /// module's entries inside an archive.
    pub fn archive_prefix(&self) -> String {
        format!("{}/{}", self.group, self.artifact)
    }
}

impl FromStr for ModuleId {
    type Err = ParseModuleIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseModuleIdError {
            input: s.to_string(),
        };
        let (group, artifact) = s.split_once(':').ok_or_else(err)?;
        if group.is_empty() || artifact.is_empty() || artifact.contains(':') {
            return Err(err());
        }
        Ok(Self::new(group, artifact))
    }
}

impl TryFrom<String> for ModuleId {
    type Error = ParseModuleIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleId> for String {
    fn from(id: ModuleId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let id: ModuleId = "com.acme:core".parse().unwrap();
        assert_eq!(id.group(), "com.acme");
        assert_eq!(id.artifact(), "core");
        assert_eq!(id.to_string(), "com.acme:core");
    }

    #[test]
    fn parse_rejects_missing_colon() {
        assert!("com.acme".parse::<ModuleId>().is_err());
    }

    #[test]
    fn parse_rejects_empty_parts() {
        assert!(":core".parse::<ModuleId>().is_err());
        assert!("com.acme:".parse::<ModuleId>().is_err());
    }

    #[test]
    fn parse_rejects_extra_segments() {
        let err = "a:b:c".parse::<ModuleId>().unwrap_err();
        assert_eq!(err.input, "a:b:c");
    }

    #[test]
    fn archive_prefix_uses_slash() {
        let id = ModuleId::new("com.acme", "core");
        assert_eq!(id.archive_prefix(), "com.acme/core");
    }

    #[test]
    fn serde_as_plain_string() {
        let id = ModuleId::new("com.acme", "core");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"com.acme:core\"");
        let back: ModuleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn serde_rejects_invalid() {
        assert!(serde_json::from_str::<ModuleId>("\"nocolon\"").is_err());
    }
}
