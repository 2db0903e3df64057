//! Configuration types deserialized from `ffwd.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Default per-module state directory, relative to the module base directory.
pub const DEFAULT_STATE_DIR: &str = "target/ffwd";

/// Default archive location, relative to the build root.
pub const DEFAULT_ARCHIVE_PATH: &str = ".ffwd/cache.tar.gz";

/// The top-level configuration parsed from `ffwd.toml`.
///
/// Every section is optional; an empty file yields the same settings as
/// [`FfwdConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FfwdConfig {
    /// Cache toggles and reactor-wide file excludes.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Archive location and load/save toggles.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Unit-of-work include/exclude patterns.
    #[serde(default)]
    pub executions: ExecutionFilterConfig,
    /// Per-module overrides keyed by `group:artifact`.
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleOverride>,
}

/// Core cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Master switch. When off, every module builds and nothing is recorded.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Compare content checksums; when off, last-modified timestamps are used.
    #[serde(default = "default_true")]
    pub checksums: bool,
    /// Directory holding `state.json`, relative to each module's base directory.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    /// Reactor-wide file exclude globs, relative to each module's base directory.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub exclude: Vec<String>,
    /// Worker threads for evaluating a reactor layer (0 = available parallelism).
    #[serde(default)]
    pub threads: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            checksums: true,
            state_dir: default_state_dir(),
            exclude: Vec::new(),
            threads: 0,
        }
    }
}

/// Archive settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Archive file, relative to the build root unless absolute.
    #[serde(default = "default_archive_path")]
    pub path: String,
    /// Restore missing outputs of fast-forwarded modules from the archive.
    #[serde(default = "default_true")]
    pub load: bool,
    /// Write a fresh archive after recording.
    #[serde(default = "default_true")]
    pub save: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: default_archive_path(),
            load: true,
            save: true,
        }
    }
}

/// Glob patterns over `group:artifact:version:goal@executionId`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionFilterConfig {
    /// Executions that participate in caching (empty = all).
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub include: Vec<String>,
    /// Executions that never participate in caching; wins over `include`.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub exclude: Vec<String>,
}

/// Settings that apply to a single module.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleOverride {
    /// Whether this module participates in caching.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Additional file exclude globs for this module only.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub exclude: Vec<String>,
}

impl Default for ModuleOverride {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_state_dir() -> String {
    DEFAULT_STATE_DIR.to_string()
}

fn default_archive_path() -> String {
    DEFAULT_ARCHIVE_PATH.to_string()
}

/// Deserializes a field that can be either a single string or a list of strings.
///
/// Allows `exclude = "**/*.tmp"` as shorthand for `exclude = ["**/*.tmp"]`.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

#[cfg(test)]
mod tests {
    use crate::loader::load_config_from_str;

    #[test]
    fn empty_file_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert!(config.cache.enabled);
        assert!(config.cache.checksums);
        assert_eq!(config.cache.state_dir, "target/ffwd");
        assert_eq!(config.cache.threads, 0);
        assert_eq!(config.archive.path, ".ffwd/cache.tar.gz");
        assert!(config.archive.load);
        assert!(config.archive.save);
        assert!(config.executions.include.is_empty());
        assert!(config.modules.is_empty());
    }

    #[test]
    fn exclude_single_string() {
        let toml = r#"
[cache]
exclude = "**/*.tmp"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.cache.exclude, vec!["**/*.tmp"]);
    }

    #[test]
    fn execution_patterns_list() {
        let toml = r#"
[executions]
include = ["com.acme*"]
exclude = ["*@deploy", "*:install@*"]
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.executions.include, vec!["com.acme*"]);
        assert_eq!(config.executions.exclude.len(), 2);
    }

    #[test]
    fn module_override_defaults_to_enabled() {
        let toml = r#"
[modules."com.acme:core"]
exclude = ["src/generated/**"]
"#;
        let config = load_config_from_str(toml).unwrap();
        let m = &config.modules["com.acme:core"];
        assert!(m.enabled);
        assert_eq!(m.exclude, vec!["src/generated/**"]);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let toml = r#"
[archive]
save = false
"#;
        let config = load_config_from_str(toml).unwrap();
        assert!(!config.archive.save);
        assert!(config.archive.load);
        assert_eq!(config.archive.path, ".ffwd/cache.tar.gz");
    }
}
