//! Error types for the slopefos core library.
//!
//! Uses `thiserror` for public API error types covering configuration and
//! the filesystem persistence helpers.

use std::path::PathBuf;

/// Top-level error type for the core library.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = CoreError::Config(ConfigError::Invalid {
            message: "split.test_fraction must be in (0, 1)".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: split.test_fraction must be in (0, 1)"
        );
    }

    #[test]
    fn test_error_display_file_not_found() {
        let err = ConfigError::FileNotFound {
            path: PathBuf::from("/etc/slopefos.toml"),
        };
        assert_eq!(
            err.to_string(),
            "Configuration file not found: /etc/slopefos.toml"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CoreError = io_err.into();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
