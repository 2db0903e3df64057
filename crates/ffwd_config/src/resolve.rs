//! Module resolution: merging reactor-wide and module-specific settings.

use crate::types::FfwdConfig;
use ffwd_common::ModuleId;

/// Effective cache settings for one module.
///
/// Reactor-wide excludes form the base and module excludes are appended.
/// A module is enabled only when both the master switch and its own toggle
/// are on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSettings {
    /// The module these settings apply to.
    pub module: ModuleId,
    /// Whether the module participates in caching.
    pub enabled: bool,
    /// Whether checksums (rather than timestamps) decide staleness.
    pub checksums: bool,
    /// File exclude globs, relative to the module base directory.
    pub excludes: Vec<String>,
    /// State directory, relative to the module base directory.
    pub state_dir: String,
}

/// Resolves the effective settings for `module`.
///
/// Modules without a `[modules."..."]` table get the reactor-wide settings.
pub fn resolve_module(config: &FfwdConfig, module: &ModuleId) -> ModuleSettings {
    let overrides = config.modules.get(&module.to_string());

    let mut excludes = config.cache.exclude.clone();
    if let Some(o) = overrides {
        excludes.extend(o.exclude.iter().cloned());
    }

    ModuleSettings {
        module: module.clone(),
        enabled: config.cache.enabled && overrides.map_or(true, |o| o.enabled),
        checksums: config.cache.checksums,
        excludes,
        state_dir: config.cache.state_dir.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    fn id(s: &str) -> ModuleId {
        s.parse().unwrap()
    }

    #[test]
    fn unknown_module_gets_reactor_settings() {
        let toml = r#"
[cache]
exclude = ["**/*.tmp"]
"#;
        let config = load_config_from_str(toml).unwrap();
        let settings = resolve_module(&config, &id("com.acme:core"));
        assert!(settings.enabled);
        assert!(settings.checksums);
        assert_eq!(settings.excludes, vec!["**/*.tmp"]);
        assert_eq!(settings.state_dir, "target/ffwd");
    }

    #[test]
    fn module_excludes_are_appended() {
        let toml = r#"
[cache]
exclude = ["**/*.tmp"]

[modules."com.acme:core"]
exclude = ["src/generated/**"]
"#;
        let config = load_config_from_str(toml).unwrap();
        let settings = resolve_module(&config, &id("com.acme:core"));
        assert_eq!(settings.excludes, vec!["**/*.tmp", "src/generated/**"]);

        let other = resolve_module(&config, &id("com.acme:web"));
        assert_eq!(other.excludes, vec!["**/*.tmp"]);
    }

    #[test]
    fn module_toggle_disables() {
        let toml = r#"
[modules."com.acme:web"]
enabled = false
"#;
        let config = load_config_from_str(toml).unwrap();
        assert!(!resolve_module(&config, &id("com.acme:web")).enabled);
        assert!(resolve_module(&config, &id("com.acme:core")).enabled);
    }

    #[test]
    fn master_switch_wins_over_module_toggle() {
        let toml = r#"
[cache]
enabled = false

[modules."com.acme:core"]
enabled = true
"#;
        let config = load_config_from_str(toml).unwrap();
        assert!(!resolve_module(&config, &id("com.acme:core")).enabled);
    }
}
