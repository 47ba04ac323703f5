#![forbid(unsafe_code)]

//! Store configuration.
//!
//! [`StoreConfig`] decides when edits reach persistence and under which root
//! namespace the backend JSON object is mounted. With the `policy-config`
//! feature it can be read from TOML or JSON text:
//!
//! ```toml
//! commit_mode = "deferred"
//! root_namespace = "settings"
//! ```

use std::fmt;

use subform_core::KeyPath;

/// When user edits are dispatched to persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "policy-config", derive(serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(rename_all = "snake_case"))]
pub enum CommitMode {
    /// Every write is dispatched at once.
    #[default]
    Immediate,
    /// Writes are staged until [`SettingsStore::save`](crate::store::SettingsStore::save).
    Deferred,
}

/// Errors from configuration parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The text could not be parsed.
    Parse { format: &'static str, reason: String },
    /// `root_namespace` is not a single key-path segment.
    InvalidNamespace(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { format, reason } => write!(f, "invalid {format} config: {reason}"),
            Self::InvalidNamespace(ns) => {
                write!(f, "root_namespace '{ns}' must be a single key segment")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default, deny_unknown_fields))]
pub struct StoreConfig {
    pub commit_mode: CommitMode,
    /// Namespace the backend object is mounted under (`settings`).
    pub root_namespace: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            commit_mode: CommitMode::Immediate,
            root_namespace: "settings".to_owned(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn with_commit_mode(mut self, mode: CommitMode) -> Self {
        self.commit_mode = mode;
        self
    }

    #[must_use]
    pub fn with_root_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.root_namespace = namespace.into();
        self
    }

    /// Check that the namespace is one valid key-path segment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match KeyPath::parse(&self.root_namespace) {
            Ok(key) if key.segments().count() == 1 => Ok(()),
            _ => Err(ConfigError::InvalidNamespace(self.root_namespace.clone())),
        }
    }

    /// Parse and validate TOML text. Missing fields take their defaults.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|err| ConfigError::Parse {
            format: "toml",
            reason: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON text. Missing fields take their defaults.
    #[cfg(feature = "policy-config")]
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|err| ConfigError::Parse {
            format: "json",
            reason: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_immediate_under_settings() {
        let config = StoreConfig::default();
        assert_eq!(config.commit_mode, CommitMode::Immediate);
        assert_eq!(config.root_namespace, "settings");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_multi_segment_namespace() {
        let config = StoreConfig::default().with_root_namespace("settings-general");
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidNamespace("settings-general".into()))
        );
        assert!(StoreConfig::default().with_root_namespace("").validate().is_err());
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn toml_overrides_and_defaults() {
        let config = StoreConfig::from_toml_str("commit_mode = \"deferred\"\n").unwrap();
        assert_eq!(config.commit_mode, CommitMode::Deferred);
        assert_eq!(config.root_namespace, "settings");
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn json_parses_and_validates() {
        let config =
            StoreConfig::from_json_str(r#"{"commit_mode":"immediate","root_namespace":"bazarr"}"#)
                .unwrap();
        assert_eq!(config.root_namespace, "bazarr");
        assert!(matches!(
            StoreConfig::from_json_str(r#"{"root_namespace":"a-b"}"#),
            Err(ConfigError::InvalidNamespace(_))
        ));
        assert!(matches!(
            StoreConfig::from_json_str(r#"{"commit_mode":"sometimes"}"#),
            Err(ConfigError::Parse { format: "json", .. })
        ));
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn unknown_fields_are_rejected() {
        assert!(StoreConfig::from_toml_str("colour = 1").is_err());
    }
}
