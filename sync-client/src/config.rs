//! Client configuration: default permission profiles, persisted filter
//! toggles and view shape.
//!
//! Configuration is loaded from a TOML file. Every section is optional:
//!
//! ```toml
//! [defaults.direct]
//! sounds_disabled = true
//!
//! [defaults.group]
//! paused = true
//!
//! [filters]
//! text = "ab"
//! required = ["pose"]
//! favorites_only = false
//!
//! [view]
//! grouping = "owner"
//! order = "description"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use syncview_core::{FilterCriteria, Predicate, TextField, ViewOptions};
use syncview_types::{DefaultPermissions, MetadataAttribute};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Default permission profiles per relationship.
    pub defaults: DefaultPermissions,
    /// Persisted filter toggles.
    pub filters: FilterConfig,
    /// Grouping and ordering of the shared-data view.
    pub view: ViewOptions,
}

/// Persisted filter toggles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Free-text search, matched against every text field.
    pub text: String,
    /// Metadata attributes an entry must have.
    pub required: Vec<MetadataAttribute>,
    /// Only show favorites.
    pub favorites_only: bool,
}

impl FilterConfig {
    /// Build the criteria these toggles describe. Unset toggles add nothing.
    pub fn to_criteria(&self) -> FilterCriteria {
        let mut criteria = FilterCriteria::new();
        if !self.text.trim().is_empty() {
            criteria.push(Predicate::text_contains(self.text.trim(), &TextField::ALL));
        }
        for attribute in &self.required {
            criteria.push(Predicate::RequiresAttribute(*attribute));
        }
        if self.favorites_only {
            criteria.push(Predicate::FavoritesOnly);
        }
        criteria
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::SerializeError)?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to write configuration file.
    #[error("failed to write config file {path}: {source}")]
    WriteError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to serialize configuration.
    #[error("failed to serialize config: {0}")]
    SerializeError(toml::ser::Error),
}

/// Read access to user configuration.
pub trait ConfigStore: Send + Sync {
    /// Default permission profiles.
    fn default_permissions(&self) -> DefaultPermissions;

    /// Persisted filter toggles.
    fn filters(&self) -> FilterConfig;

    /// Grouping and ordering.
    fn view(&self) -> ViewOptions;

    /// Criteria built from the persisted toggles.
    fn criteria(&self) -> FilterCriteria {
        self.filters().to_criteria()
    }
}

/// [`ConfigStore`] backed by a TOML file.
#[derive(Debug)]
pub struct TomlConfigStore {
    path: PathBuf,
    config: RwLock<ClientConfig>,
}

impl TomlConfigStore {
    /// Load the store from `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = ClientConfig::from_file(&path)?;
        Ok(Self {
            path,
            config: RwLock::new(config),
        })
    }

    /// Load the store from `path`, starting from defaults if it does not exist.
    pub fn open_or_default(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self {
                path,
                config: RwLock::new(ClientConfig::default()),
            });
        }
        Self::open(path)
    }

    /// Path this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the loaded configuration.
    pub fn config(&self) -> ClientConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the file. The previous configuration stays on error.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let config = ClientConfig::from_file(&self.path)?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    /// Persist new filter toggles.
    pub fn set_filters(&self, filters: FilterConfig) -> Result<(), ConfigError> {
        let mut config = self.config();
        config.filters = filters;
        config.save(&self.path)?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }
}

impl ConfigStore for TomlConfigStore {
    fn default_permissions(&self) -> DefaultPermissions {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .defaults
    }

    fn filters(&self) -> FilterConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .filters
            .clone()
    }

    fn view(&self) -> ViewOptions {
        self.config.read().unwrap_or_else(PoisonError::into_inner).view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncview_core::{Grouping, OrderKey};
    use syncview_types::PermissionSet;

    #[test]
    fn empty_config_is_all_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(config.filters.to_criteria().is_pass_through());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[defaults.direct]
sounds_disabled = true

[defaults.group]
paused = true
sticky = true

[filters]
text = "ab"
required = ["pose", "world_data"]
favorites_only = true

[view]
grouping = "code"
order = "owner_alias"
"#;

        let config: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.defaults.direct,
            PermissionSet::default().with(syncview_types::PermissionFlag::SoundsDisabled, true)
        );
        assert!(config.defaults.group.paused);
        assert!(config.defaults.group.sticky);
        assert_eq!(
            config.filters.required,
            vec![MetadataAttribute::Pose, MetadataAttribute::WorldData]
        );
        assert_eq!(config.view.grouping, Grouping::Code);
        assert_eq!(config.view.order, Some(OrderKey::OwnerAlias));
        assert_eq!(config.filters.to_criteria().predicates().len(), 4);
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let toml = r#"
[filters]
required = ["sparkles"]
"#;
        assert!(toml::from_str::<ClientConfig>(toml).is_err());
    }

    #[test]
    fn whitespace_text_adds_no_predicate() {
        let filters = FilterConfig {
            text: "   ".into(),
            ..Default::default()
        };
        assert!(filters.to_criteria().is_pass_through());
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syncview.toml");
        std::fs::write(&path, "[filters\ntext = ").unwrap();

        let err = TomlConfigStore::open(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn store_persists_filter_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syncview.toml");

        let store = TomlConfigStore::open_or_default(&path).unwrap();
        assert_eq!(store.filters(), FilterConfig::default());

        let filters = FilterConfig {
            text: "ab".into(),
            required: vec![MetadataAttribute::Pose],
            favorites_only: false,
        };
        store.set_filters(filters.clone()).unwrap();

        let reopened = TomlConfigStore::open(&path).unwrap();
        assert_eq!(reopened.filters(), filters);
        assert_eq!(reopened.criteria().predicates().len(), 2);
    }

    #[test]
    fn reload_keeps_previous_config_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syncview.toml");
        std::fs::write(&path, "[defaults.group]\npaused = true\n").unwrap();

        let store = TomlConfigStore::open(&path).unwrap();
        std::fs::write(&path, "not = [valid").unwrap();

        assert!(store.reload().is_err());
        assert!(store.default_permissions().group.paused);
    }
}
