//! Units of work and their persisted form.
//!
//! An [`ExecutionEntry`] pairs an [`ExecutionKey`] with the effective
//! configuration the unit ran with. On disk the configuration is stored as
//! markup next to its digest; loading re-parses the markup and rejects the
//! record if the digest no longer matches. The digest only guards the stored
//! markup; entries are always compared node by node.

use std::fmt;

use ffwd_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::config_tree::ConfigTree;
use crate::error::CacheError;
use crate::fingerprint::{self, Comparison};
use crate::matcher;

/// Identity of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionKey {
    /// Group of the plugin providing the goal.
    pub group: String,
    /// Artifact of the plugin providing the goal.
    pub artifact: String,
    /// Plugin version.
    pub version: String,
    /// Goal name.
    pub goal: String,
    /// Execution id within the module's build plan.
    pub execution_id: String,
}

impl ExecutionKey {
    /// Creates a key from its five parts.
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
        goal: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
            goal: goal.into(),
            execution_id: execution_id.into(),
        }
    }

    /// Canonical reference `group:artifact:version:goal@executionId`.
    pub fn reference(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}@{}",
            self.group, self.artifact, self.version, self.goal, self.execution_id
        )
    }
}

/// A unit of work together with its effective configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ExecutionRecord", into = "ExecutionRecord")]
pub struct ExecutionEntry {
    key: ExecutionKey,
    configuration: ConfigTree,
    markup: String,
    digest: ContentHash,
}

/// Serialized shape of an [`ExecutionEntry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExecutionRecord {
    #[serde(flatten)]
    key: ExecutionKey,
    configuration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<ContentHash>,
}

impl ExecutionEntry {
    /// Creates an entry from a key and its configuration tree.
    ///
    /// Fails if the markup form of the configuration does not read back into
    /// the same tree.
    pub fn new(key: ExecutionKey, configuration: ConfigTree) -> Result<Self, CacheError> {
        let markup = configuration.to_markup()?;
        let digest = configuration.digest();
        if ConfigTree::from_markup(&markup)?.digest() != digest {
            return Err(CacheError::Markup {
                reason: format!("configuration of {key} does not survive a markup round-trip"),
            });
        }
        Ok(Self {
            key,
            configuration,
            markup,
            digest,
        })
    }

    /// Creates an entry by parsing configuration markup.
    pub fn from_markup(key: ExecutionKey, markup: &str) -> Result<Self, CacheError> {
        Self::new(key, ConfigTree::from_markup(markup)?)
    }

    /// The unit-of-work identity.
    pub fn key(&self) -> &ExecutionKey {
        &self.key
    }

    /// The effective configuration.
    pub fn configuration(&self) -> &ConfigTree {
        &self.configuration
    }

    /// Digest of the configuration tree.
    pub fn digest(&self) -> ContentHash {
        self.digest
    }

    /// The configuration as compact markup.
    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// Canonical reference string of the key.
    pub fn reference(&self) -> String {
        self.key.reference()
    }

    /// Include/exclude decision for this entry; see [`matcher::matches`].
    pub fn matches(&self, includes: Option<&[String]>, excludes: Option<&[String]>) -> bool {
        matcher::matches(&self.reference(), includes, excludes)
    }

    /// Structural comparison of this (recorded) entry against `current`.
    ///
    /// Keys are not compared; callers pair entries by key first.
    pub fn compare(&self, current: &ExecutionEntry) -> Comparison {
        fingerprint::compare(&self.configuration, &current.configuration)
    }
}

impl TryFrom<ExecutionRecord> for ExecutionEntry {
    type Error = CacheError;

    fn try_from(record: ExecutionRecord) -> Result<Self, Self::Error> {
        let entry = Self::from_markup(record.key, &record.configuration)?;
        if let Some(recorded) = record.digest {
            if recorded != entry.digest {
                return Err(CacheError::DigestMismatch {
                    execution: entry.reference(),
                    recorded: recorded.to_string(),
                    actual: entry.digest.to_string(),
                });
            }
        }
        Ok(entry)
    }
}

impl From<ExecutionEntry> for ExecutionRecord {
    fn from(entry: ExecutionEntry) -> Self {
        Self {
            key: entry.key,
            configuration: entry.markup,
            digest: Some(entry.digest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_tree::{NodeId, TreeSource};

    fn key() -> ExecutionKey {
        ExecutionKey::new(
            "com.acme",
            "my-plugin",
            "1.0",
            "do-something",
            "default-do-something",
        )
    }

    #[test]
    fn canonical_reference() {
        assert_eq!(
            key().reference(),
            "com.acme:my-plugin:1.0:do-something@default-do-something"
        );
    }

    #[test]
    fn entry_matching_delegates_to_reference() {
        let entry = ExecutionEntry::from_markup(key(), "<configuration/>").unwrap();
        assert!(entry.matches(None, None));
        assert!(entry.matches(Some(&[]), None));
        let includes = vec!["com.acme*".to_string()];
        assert!(entry.matches(Some(&includes), None));
        let includes = vec!["foo*".to_string()];
        assert!(!entry.matches(Some(&includes), None));
    }

    #[test]
    fn serde_roundtrip_preserves_identity_and_structure() {
        let markup = r#"<configuration><compilerArgs><arg>-Xlint</arg><arg>-g</arg></compilerArgs><release>17</release><mode kind="strict"/></configuration>"#;
        let entry = ExecutionEntry::from_markup(key(), markup).unwrap();

        let json = serde_json::to_string(&entry).unwrap();
        let back: ExecutionEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(back.key(), entry.key());
        assert_eq!(back.digest(), entry.digest());
        assert!(entry.compare(&back).is_equal());
        assert!(
            fingerprint::compare(entry.configuration(), back.configuration()).is_equal()
        );
    }

    #[test]
    fn persisted_form_has_flat_identity_fields() {
        let entry = ExecutionEntry::from_markup(key(), "<c><x>1</x></c>").unwrap();
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["group"], "com.acme");
        assert_eq!(value["goal"], "do-something");
        assert_eq!(value["execution_id"], "default-do-something");
        assert_eq!(value["configuration"], "<c><x>1</x></c>");
        assert!(value.get("digest").is_some());
    }

    #[test]
    fn record_without_digest_is_accepted() {
        let json = r#"{
            "group": "g", "artifact": "a", "version": "1", "goal": "compile",
            "execution_id": "default-compile",
            "configuration": "<configuration><debug>true</debug></configuration>"
        }"#;
        let entry: ExecutionEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.reference(), "g:a:1:compile@default-compile");
    }

    #[test]
    fn tampered_configuration_is_rejected() {
        let entry = ExecutionEntry::from_markup(key(), "<c><x>1</x></c>").unwrap();
        let mut value = serde_json::to_value(&entry).unwrap();
        value["configuration"] = serde_json::Value::from("<c><x>2</x></c>");
        let err = serde_json::from_value::<ExecutionEntry>(value).unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));
    }

    #[test]
    fn compare_reports_changed_value() {
        let recorded = ExecutionEntry::from_markup(key(), "<c><x>1</x></c>").unwrap();
        let current = ExecutionEntry::from_markup(key(), "<c><x>2</x></c>").unwrap();
        match recorded.compare(&current) {
            Comparison::Different(m) => assert_eq!(m.path, "/c{0}"),
            Comparison::Equal => panic!("expected a mismatch"),
        }
    }

    #[test]
    fn programmatic_tree_roundtrips() {
        let mut tree = ConfigTree::new("configuration");
        let args = tree.push_child(NodeId::ROOT, "args", None);
        tree.push_child(args, "arg", Some("a & b"));
        let entry = ExecutionEntry::new(key(), tree).unwrap();
        let back = ExecutionEntry::from_markup(key(), entry.markup()).unwrap();
        assert_eq!(back.digest(), entry.digest());
    }

    fn persisted(entry: &ExecutionEntry) -> ExecutionEntry {
        let json = serde_json::to_string(entry).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn empty_leaf_value_survives_persistence() {
        let mut tree = ConfigTree::new("configuration");
        tree.push_child(NodeId::ROOT, "flag", Some(""));
        let entry = ExecutionEntry::new(key(), tree).unwrap();
        let back = persisted(&entry);
        assert_eq!(back.configuration().root().child("flag").unwrap().value(), Some(""));
        assert!(entry.compare(&back).is_equal());
    }

    #[test]
    fn mixed_content_survives_persistence() {
        let mut tree = ConfigTree::leaf("configuration", " x ");
        tree.push_child(NodeId::ROOT, "a", Some("1"));
        let entry = ExecutionEntry::new(key(), tree).unwrap();
        let back = persisted(&entry);
        assert_eq!(back.configuration().root().value(), Some(" x "));
        assert!(entry.compare(&back).is_equal());
    }

    #[test]
    fn adapter_tags_survive_persistence() {
        #[derive(Clone)]
        struct Json(&'static str, Option<&'static str>, Vec<Json>);
        impl TreeSource for Json {
            fn tag_name(&self) -> &str {
                self.0
            }
            fn value(&self) -> Option<&str> {
                self.1
            }
            fn children(&self) -> Vec<Self> {
                self.2.clone()
            }
        }

        let source = Json(
            "",
            None,
            vec![
                Json("my key", Some("a b"), vec![]),
                Json("1st", Some(""), vec![]),
                Json("@weird", None, vec![Json("x", Some("1"), vec![])]),
            ],
        );
        let entry = ExecutionEntry::new(key(), ConfigTree::from_source(&source)).unwrap();
        let back = persisted(&entry);
        assert!(entry.compare(&back).is_equal());
        let tags: Vec<&str> = back.configuration().walk().map(|n| n.tag_name()).collect();
        assert_eq!(tags, vec!["", "my key", "1st", "@weird", "x"]);
    }

    #[test]
    fn values_imitating_structure_compare_different() {
        let forged = ConfigTree::leaf("a", "x\u{1e}/a{0}\u{1f}b\u{1f}\u{1}y");
        let mut nested = ConfigTree::leaf("a", "x");
        nested.push_child(NodeId::ROOT, "b", Some("y"));
        let recorded = ExecutionEntry::new(key(), forged).unwrap();
        let current = ExecutionEntry::new(key(), nested).unwrap();
        assert_ne!(recorded.digest(), current.digest());
        match recorded.compare(&current) {
            Comparison::Different(m) => assert_eq!(m.path, "/"),
            Comparison::Equal => panic!("expected a mismatch"),
        }
    }
}
