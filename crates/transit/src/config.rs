//! Resolved configuration consumed by the migration core.
//!
//! Loading files and environment variables is the caller's job; this module
//! only defines the shapes and maps named systems onto their roles.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::migrate::{
    ChildPlan, DEFAULT_ASSET_CONCURRENCY, DEFAULT_SINK_CONCURRENCY, DEFAULT_SOURCE_CONCURRENCY,
    ParentPlan, SourceMode, WriteMode,
};
use crate::sink::SinkCredentials;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown system '{0}' (expected one of: swapi, swimg, odoo)")]
    UnknownSystem(String),

    #[error("No {0} system configured")]
    MissingSystem(SystemKind),

    #[error("Systems '{first}' and '{second}' both configure the {kind}")]
    DuplicateSystem {
        kind: SystemKind,
        first: String,
        second: String,
    },

    #[error("System '{system}' is missing '{field}'")]
    MissingField {
        system: String,
        field: &'static str,
    },
}

/// Connection settings of one external system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub url: String,
    #[serde(default)]
    pub db: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Optional proactive pacing on top of the concurrency limit.
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

/// Role a named system plays in a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    Source,
    Assets,
    Sink,
}

impl SystemKind {
    /// Resolve a configured system name. Case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "swapi" | "source" => Some(SystemKind::Source),
            "swimg" | "assets" | "images" => Some(SystemKind::Assets),
            "odoo" | "sink" => Some(SystemKind::Sink),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SystemKind::Source => "source",
            SystemKind::Assets => "assets",
            SystemKind::Sink => "sink",
        }
    }
}

impl fmt::Display for SystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning and mapping for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    pub source_concurrency: usize,
    pub asset_concurrency: usize,
    pub sink_concurrency: usize,
    pub write_mode: WriteMode,
    pub source_mode: SourceMode,
    pub parents: ParentPlan,
    pub children: ChildPlan,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            source_concurrency: DEFAULT_SOURCE_CONCURRENCY,
            asset_concurrency: DEFAULT_ASSET_CONCURRENCY,
            sink_concurrency: DEFAULT_SINK_CONCURRENCY,
            write_mode: WriteMode::default(),
            source_mode: SourceMode::default(),
            parents: ParentPlan::default(),
            children: ChildPlan::default(),
        }
    }
}

/// Everything a run needs, with each system assigned to its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub source: SystemConfig,
    pub assets: SystemConfig,
    pub sink: SystemConfig,
    pub settings: MigrationSettings,
}

impl MigrationConfig {
    /// Assign named systems to roles.
    ///
    /// Every role must be filled exactly once, and the sink needs `db`,
    /// `username` and `password`.
    pub fn from_systems(
        systems: &HashMap<String, SystemConfig>,
        settings: MigrationSettings,
    ) -> Result<Self, ConfigError> {
        let mut resolved: HashMap<SystemKind, (&str, &SystemConfig)> = HashMap::new();

        let mut names: Vec<&String> = systems.keys().collect();
        names.sort();
        for name in names {
            let kind =
                SystemKind::from_name(name).ok_or_else(|| ConfigError::UnknownSystem(name.clone()))?;
            let system = &systems[name];
            if system.url.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    system: name.clone(),
                    field: "url",
                });
            }
            if let Some((first, _)) = resolved.insert(kind, (name.as_str(), system)) {
                return Err(ConfigError::DuplicateSystem {
                    kind,
                    first: first.to_string(),
                    second: name.clone(),
                });
            }
        }

        let mut take = |kind: SystemKind| {
            resolved
                .remove(&kind)
                .ok_or(ConfigError::MissingSystem(kind))
        };
        let (_, source) = take(SystemKind::Source)?;
        let (_, assets) = take(SystemKind::Assets)?;
        let (sink_name, sink) = take(SystemKind::Sink)?;

        for (field, value) in [
            ("db", &sink.db),
            ("username", &sink.username),
            ("password", &sink.password),
        ] {
            if value.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::MissingField {
                    system: sink_name.to_string(),
                    field,
                });
            }
        }

        Ok(Self {
            source: source.clone(),
            assets: assets.clone(),
            sink: sink.clone(),
            settings,
        })
    }

    /// Sink login details. Empty strings for anything unset.
    pub fn sink_credentials(&self) -> SinkCredentials {
        SinkCredentials {
            db: self.sink.db.clone().unwrap_or_default(),
            username: self.sink.username.clone().unwrap_or_default(),
            password: self.sink.password.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(url: &str) -> SystemConfig {
        SystemConfig {
            url: url.to_string(),
            ..SystemConfig::default()
        }
    }

    fn odoo() -> SystemConfig {
        SystemConfig {
            url: "https://odoo.test".to_string(),
            db: Some("swdb".to_string()),
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            requests_per_second: None,
        }
    }

    fn all_systems() -> HashMap<String, SystemConfig> {
        HashMap::from([
            ("SWAPI".to_string(), system("https://swapi.test/api")),
            ("SWIMG".to_string(), system("https://img.test/characters")),
            ("odoo".to_string(), odoo()),
        ])
    }

    #[test]
    fn test_system_kind_from_name() {
        assert_eq!(SystemKind::from_name("SWAPI"), Some(SystemKind::Source));
        assert_eq!(SystemKind::from_name("swimg"), Some(SystemKind::Assets));
        assert_eq!(SystemKind::from_name(" Odoo "), Some(SystemKind::Sink));
        assert_eq!(SystemKind::from_name("sink"), Some(SystemKind::Sink));
        assert_eq!(SystemKind::from_name("postgres"), None);
    }

    #[test]
    fn test_from_systems_assigns_roles() {
        let config = MigrationConfig::from_systems(&all_systems(), MigrationSettings::default())
            .expect("config");

        assert_eq!(config.source.url, "https://swapi.test/api");
        assert_eq!(config.assets.url, "https://img.test/characters");
        assert_eq!(config.sink_credentials().db, "swdb");
        assert_eq!(config.settings.sink_concurrency, DEFAULT_SINK_CONCURRENCY);
    }

    #[test]
    fn test_from_systems_rejects_unknown_names() {
        let mut systems = all_systems();
        systems.insert("redis".to_string(), system("redis://localhost"));

        let err = MigrationConfig::from_systems(&systems, MigrationSettings::default())
            .expect_err("unknown system");
        assert_eq!(err, ConfigError::UnknownSystem("redis".to_string()));
    }

    #[test]
    fn test_from_systems_requires_every_role() {
        let mut systems = all_systems();
        systems.remove("SWIMG");

        let err = MigrationConfig::from_systems(&systems, MigrationSettings::default())
            .expect_err("missing assets");
        assert_eq!(err, ConfigError::MissingSystem(SystemKind::Assets));
    }

    #[test]
    fn test_from_systems_rejects_duplicate_roles() {
        let mut systems = all_systems();
        systems.insert("source".to_string(), system("https://mirror.test/api"));

        let err = MigrationConfig::from_systems(&systems, MigrationSettings::default())
            .expect_err("duplicate source");
        assert!(matches!(
            err,
            ConfigError::DuplicateSystem {
                kind: SystemKind::Source,
                ..
            }
        ));
    }

    #[test]
    fn test_from_systems_requires_sink_credentials() {
        let mut systems = all_systems();
        systems.get_mut("odoo").expect("odoo").password = None;

        let err = MigrationConfig::from_systems(&systems, MigrationSettings::default())
            .expect_err("missing password");
        assert_eq!(
            err,
            ConfigError::MissingField {
                system: "odoo".to_string(),
                field: "password",
            }
        );
    }

    #[test]
    fn test_settings_deserialize_partial() {
        let settings: MigrationSettings = serde_json::from_value(serde_json::json!({
            "sink_concurrency": 5,
            "write_mode": "blind_create"
        }))
        .expect("settings");

        assert_eq!(settings.sink_concurrency, 5);
        assert_eq!(settings.source_concurrency, DEFAULT_SOURCE_CONCURRENCY);
        assert_eq!(settings.write_mode, WriteMode::BlindCreate);
        assert_eq!(settings.parents, ParentPlan::default());
    }
}
