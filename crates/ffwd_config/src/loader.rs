//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::FfwdConfig;
use ffwd_common::ModuleId;
use std::path::Path;

/// Name of the configuration file at the build root.
pub const CONFIG_FILE: &str = "ffwd.toml";

/// Loads and validates `ffwd.toml` from a build root directory.
pub fn load_config(root: &Path) -> Result<FfwdConfig, ConfigError> {
    load_config_file(&root.join(CONFIG_FILE))
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<FfwdConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Like [`load_config`], but a missing file yields the default configuration.
///
/// A file that exists but fails to parse or validate is still an error.
pub fn load_config_or_default(root: &Path) -> Result<FfwdConfig, ConfigError> {
    match load_config(root) {
        Err(ConfigError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(FfwdConfig::default())
        }
        other => other,
    }
}

/// Parses and validates an `ffwd.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<FfwdConfig, ConfigError> {
    let config: FfwdConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates module keys, patterns, and paths.
fn validate_config(config: &FfwdConfig) -> Result<(), ConfigError> {
    if config.cache.state_dir.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "cache.state_dir must not be empty".to_string(),
        ));
    }
    if (config.archive.load || config.archive.save) && config.archive.path.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "archive.path must not be empty while archive load or save is enabled".to_string(),
        ));
    }

    check_patterns("cache.exclude", &config.cache.exclude)?;
    check_patterns("executions.include", &config.executions.include)?;
    check_patterns("executions.exclude", &config.executions.exclude)?;

    for (key, module) in &config.modules {
        if key.parse::<ModuleId>().is_err() {
            return Err(ConfigError::InvalidModuleKey(key.clone()));
        }
        check_patterns(&format!("modules.\"{key}\".exclude"), &module.exclude)?;
    }
    Ok(())
}

fn check_patterns(field: &str, patterns: &[String]) -> Result<(), ConfigError> {
    if patterns.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::ValidationError(format!(
            "{field} contains an empty pattern"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml = r#"
[cache]
enabled = true
checksums = false
state_dir = "build/ffwd"
exclude = ["**/*.tmp", "**/.DS_Store"]
threads = 4

[archive]
path = "/var/cache/ffwd/reactor.tar.gz"
load = true
save = false

[executions]
include = []
exclude = ["*:maven-deploy-plugin:*"]

[modules."com.acme:core"]
exclude = "src/generated/**"

[modules."com.acme:web"]
enabled = false
"#;
        let config = load_config_from_str(toml).unwrap();
        assert!(!config.cache.checksums);
        assert_eq!(config.cache.state_dir, "build/ffwd");
        assert_eq!(config.cache.exclude.len(), 2);
        assert_eq!(config.cache.threads, 4);
        assert!(!config.archive.save);
        assert_eq!(config.executions.exclude, vec!["*:maven-deploy-plugin:*"]);
        assert_eq!(config.modules.len(), 2);
        assert!(!config.modules["com.acme:web"].enabled);
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn wrong_type_errors() {
        let toml = r#"
[cache]
enabled = "yes"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn invalid_module_key_errors() {
        let toml = r#"
[modules.core]
enabled = false
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidModuleKey(ref k) if k == "core"));
    }

    #[test]
    fn empty_pattern_errors() {
        let toml = r#"
[executions]
exclude = ["*@deploy", ""]
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn empty_state_dir_errors() {
        let toml = r#"
[cache]
state_dir = ""
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn empty_archive_path_allowed_when_unused() {
        let toml = r#"
[archive]
path = ""
load = false
save = false
"#;
        assert!(load_config_from_str(toml).is_ok());
    }

    #[test]
    fn empty_archive_path_rejected_when_saving() {
        let toml = r#"
[archive]
path = ""
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[cache]\nchecksums = false\n").unwrap();
        let config = load_config(dir.path()).unwrap();
        assert!(!config.cache.checksums);
    }

    #[test]
    fn load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ci-cache.toml");
        std::fs::write(&path, "[archive]\nsave = false\n").unwrap();
        let config = load_config_file(&path).unwrap();
        assert!(!config.archive.save);
        assert!(config.archive.load);
    }

    #[test]
    fn io_error_from_nonexistent_dir() {
        let err = load_config(Path::new("/nonexistent/dir")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(dir.path()).unwrap();
        assert!(config.cache.enabled);
    }

    #[test]
    fn broken_file_is_not_masked_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[cache\n").unwrap();
        let err = load_config_or_default(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
