//! Configuration file support for transit.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `TRANSIT__`, keys split on `__`,
//!    e.g. `TRANSIT__SYSTEMS__ODOO__PASSWORD`)
//! 3. The file passed with `--config` (TOML or JSON, by extension)
//! 4. Local config file (./transit.toml)
//! 5. XDG config file (~/.config/transit/config.toml)
//! 6. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [systems.swapi]
//! url = "https://swapi.dev/api"
//! requests_per_second = 10  # optional pacing on top of the concurrency limit
//!
//! [systems.swimg]
//! url = "https://starwars-visualguide.com/assets/img/characters"
//!
//! [systems.odoo]
//! url = "http://localhost:8069"
//! db = "odoo"
//! username = "admin"
//! password = "admin"  # or use TRANSIT__SYSTEMS__ODOO__PASSWORD
//!
//! [migration]
//! source_concurrency = 50
//! asset_concurrency = 50
//! sink_concurrency = 20
//! write_mode = "upsert"      # or "blind_create"
//! source_mode = "numbered"   # or "paginated"
//!
//! [migration.parents]
//! resource = "planets"
//! model = "res.planet"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::builder::DefaultState;
use config::{Config as ConfigBuilder, ConfigBuilder as Builder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use transit::migrate::{SourceMode, WriteMode};
use transit::{MigrationConfig, MigrationSettings, SystemConfig};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Named external systems (`swapi`, `swimg`, `odoo`).
    pub systems: HashMap<String, SystemConfig>,
    /// Limits, modes and resource plans.
    pub migration: MigrationSettings,
}

/// Values given on the command line. `None` keeps the configured value.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub source_concurrency: Option<usize>,
    pub asset_concurrency: Option<usize>,
    pub sink_concurrency: Option<usize>,
    pub write_mode: Option<WriteMode>,
    pub source_mode: Option<SourceMode>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Missing default files are ignored; an explicit `path` must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let config = Self::layered(path).build()?.try_deserialize::<Config>()?;
        tracing::debug!(
            systems = ?config.systems.keys().collect::<Vec<_>>(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn layered(path: Option<&Path>) -> Builder<DefaultState> {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("transit.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./transit.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        if let Some(path) = path {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        // TRANSIT__MIGRATION__SINK_CONCURRENCY -> migration.sink_concurrency
        builder.add_source(
            Environment::with_prefix("TRANSIT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
    }

    /// Default path of the per-user config file.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "transit").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply command-line overrides on top of the loaded settings.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        let settings = &mut self.migration;
        if let Some(n) = overrides.source_concurrency {
            settings.source_concurrency = n;
        }
        if let Some(n) = overrides.asset_concurrency {
            settings.asset_concurrency = n;
        }
        if let Some(n) = overrides.sink_concurrency {
            settings.sink_concurrency = n;
        }
        if let Some(mode) = overrides.write_mode {
            settings.write_mode = mode;
        }
        if let Some(mode) = overrides.source_mode {
            settings.source_mode = mode;
        }
    }

    /// Assign the configured systems to their roles.
    pub fn migration_config(&self) -> Result<MigrationConfig, transit::ConfigError> {
        MigrationConfig::from_systems(&self.systems, self.migration.clone())
    }
}
