//! Structural fingerprints and comparison of configuration trees.
//!
//! Equality is exact: no whitespace or numeric normalization is applied, so
//! any byte-level change to a unit's configuration invalidates it.

use std::fmt;

use ffwd_common::{ContentHash, DigestBuilder};

use crate::config_tree::{ConfigNode, ConfigTree};

/// Outcome of comparing a recorded configuration against the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// Both trees are identical.
    Equal,
    /// The trees differ; the first difference in document order.
    Different(Mismatch),
}

impl Comparison {
    /// `true` for [`Comparison::Equal`].
    pub fn is_equal(&self) -> bool {
        matches!(self, Comparison::Equal)
    }
}

/// The first point at which two trees diverge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Path of the node where the trees diverge.
    pub path: String,
    /// What differs at that node.
    pub kind: MismatchKind,
}

/// Kind of structural difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchKind {
    /// The nodes have different tag names.
    TagName {
        /// Recorded tag.
        recorded: String,
        /// Current tag.
        current: String,
    },
    /// The nodes have different scalar values.
    Value {
        /// Recorded value.
        recorded: Option<String>,
        /// Current value.
        current: Option<String>,
    },
    /// The nodes have a different number of children.
    ChildCount {
        /// Recorded count.
        recorded: usize,
        /// Current count.
        current: usize,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MismatchKind::TagName { recorded, current } => {
                write!(f, "{}: tag '{recorded}' became '{current}'", self.path)
            }
            MismatchKind::Value { recorded, current } => write!(
                f,
                "{}: value {:?} became {:?}",
                self.path,
                recorded.as_deref().unwrap_or(""),
                current.as_deref().unwrap_or("")
            ),
            MismatchKind::ChildCount { recorded, current } => write!(
                f,
                "{}: {recorded} children became {current}",
                self.path
            ),
        }
    }
}

impl ConfigNode<'_> {
    /// The node's fingerprint string.
    ///
    /// A leaf yields `path=value`; any other node yields the concatenation of
    /// its children's fingerprints in document order.
    pub fn fingerprint(&self) -> String {
        let mut out = String::new();
        self.append_fingerprint(&mut out);
        out
    }

    fn append_fingerprint(&self, out: &mut String) {
        if self.is_leaf() {
            out.push_str(&self.path());
            out.push('=');
            out.push_str(self.value().unwrap_or(""));
            return;
        }
        for child in self.children() {
            child.append_fingerprint(out);
        }
    }
}

impl ConfigTree {
    /// Fingerprint string of the root node.
    pub fn fingerprint(&self) -> String {
        self.root().fingerprint()
    }

    /// XXH3-128 digest over every node's tag, value, and child count.
    ///
    /// Nodes are hashed in document order as length-framed fields, so the
    /// shape of the tree is part of the digest. The digest guards stored
    /// configurations against corruption; equality is always decided by
    /// [`compare`].
    pub fn digest(&self) -> ContentHash {
        let mut digest = DigestBuilder::new();
        for node in self.walk() {
            digest.field(node.tag_name().as_bytes());
            match node.value() {
                Some(value) => digest.marker(1).field(value.as_bytes()),
                None => digest.marker(0),
            };
            digest.count(node.child_count());
        }
        digest.finish()
    }
}

/// Compares two trees depth-first in document order.
///
/// Sibling counts, tag names, and values are compared at every position; the
/// first difference short-circuits the walk.
pub fn compare(recorded: &ConfigTree, current: &ConfigTree) -> Comparison {
    match compare_nodes(recorded.root(), current.root()) {
        Some(mismatch) => Comparison::Different(mismatch),
        None => Comparison::Equal,
    }
}

fn compare_nodes(recorded: ConfigNode<'_>, current: ConfigNode<'_>) -> Option<Mismatch> {
    if recorded.tag_name() != current.tag_name() {
        return Some(Mismatch {
            path: recorded.path(),
            kind: MismatchKind::TagName {
                recorded: recorded.tag_name().to_string(),
                current: current.tag_name().to_string(),
            },
        });
    }
    if recorded.value() != current.value() {
        return Some(Mismatch {
            path: recorded.path(),
            kind: MismatchKind::Value {
                recorded: recorded.value().map(str::to_string),
                current: current.value().map(str::to_string),
            },
        });
    }
    if recorded.child_count() != current.child_count() {
        return Some(Mismatch {
            path: recorded.path(),
            kind: MismatchKind::ChildCount {
                recorded: recorded.child_count(),
                current: current.child_count(),
            },
        });
    }
    recorded
        .children()
        .zip(current.children())
        .find_map(|(r, c)| compare_nodes(r, c))
}
