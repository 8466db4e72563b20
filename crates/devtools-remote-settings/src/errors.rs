//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why relay settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not JSON.
    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Merged settings do not fit the relay settings shape (wrong types).
    #[error("settings do not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value the relay cannot run with.
    #[error("invalid {key}: {reason}")]
    InvalidValue {
        /// Dotted camelCase settings key, e.g. `server.sendQueueCapacity`.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            reason: reason.into(),
        }
    }

    /// Settings key at fault, for invalid values.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::InvalidValue { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/devtools-remote.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot read /etc/devtools-remote.json: denied");
        assert!(err.key().is_none());
    }

    #[test]
    fn shape_error_from_serde() {
        let json_err = serde_json::from_str::<u16>("\"eighty\"").unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(matches!(err, SettingsError::Shape(_)));
    }

    #[test]
    fn invalid_value_carries_key() {
        let err = SettingsError::invalid("server.pingIntervalSecs", "must be at least 1");
        assert_eq!(err.key(), Some("server.pingIntervalSecs"));
        assert_eq!(
            err.to_string(),
            "invalid server.pingIntervalSecs: must be at least 1"
        );
    }
}
