//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating an `ffwd.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A `[modules."..."]` key is not a valid `group:artifact` id.
    #[error("invalid module key '{0}'")]
    InvalidModuleKey(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_module_key() {
        let err = ConfigError::InvalidModuleKey("core".to_string());
        assert_eq!(format!("{err}"), "invalid module key 'core'");
    }

    #[test]
    fn display_parse_error() {
        let err = ConfigError::ParseError("expected '=' at line 3".to_string());
        assert_eq!(
            format!("{err}"),
            "failed to parse configuration: expected '=' at line 3"
        );
    }

    #[test]
    fn display_validation_error() {
        let err = ConfigError::ValidationError("empty pattern".to_string());
        assert_eq!(format!("{err}"), "validation error: empty pattern");
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::IoError(io_err);
        let display = format!("{err}");
        assert!(display.starts_with("failed to read configuration:"));
    }
}
