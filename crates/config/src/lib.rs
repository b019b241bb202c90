//! Layered configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults.
//! 2. `hearth.toml` in the platform configuration directory.
//! 3. An explicitly given TOML file.
//! 4. `HEARTH_`-prefixed environment variables, with `__` separating
//!    nested keys (`HEARTH_STORAGE__MAX_CONNECTIONS=2`).

pub mod error;

use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ErrorKind, Result};

pub const CONFIG_FILE: &str = "hearth.toml";
pub const DATABASE_FILE: &str = "hearth.sqlite3";
pub const ENV_PREFIX: &str = "HEARTH_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub staging: StagingConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file; defaults to the platform data directory.
    pub database: Option<PathBuf>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: None,
            max_connections: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long the volatile cache counts as fresh after a refresh.
    pub freshness_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { freshness_ms: 5_000 }
    }
}

impl CacheConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_millis(self.freshness_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Remove orphaned staged uploads when the stores are opened.
    pub sweep_on_open: bool,
    /// Minimum age before a staged upload counts as orphaned.
    pub orphan_age_secs: u64,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            sweep_on_open: true,
            orphan_age_secs: 3_600,
        }
    }
}

impl StagingConfig {
    pub fn orphan_age(&self) -> Duration {
        Duration::from_secs(self.orphan_age_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing-subscriber` filter directives; `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "hearth")
}

impl Config {
    /// Load every layer, then validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(explicit)?)
    }

    /// The layered provider stack, without extracting it.
    pub fn figment(explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dirs) = project_dirs() {
            figment = figment.merge(Toml::file(dirs.config_dir().join(CONFIG_FILE)));
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::MissingFile(path.to_path_buf()));
            }
            figment = figment.merge(Toml::file(path));
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate a configuration from any provider stack.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.max_connections == 0 {
            exn::bail!(ErrorKind::Invalid("storage.max_connections must be at least 1".to_string()));
        }
        if self
            .storage
            .database
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            exn::bail!(ErrorKind::Invalid("storage.database must not be empty".to_string()));
        }
        if self.log.filter.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("log.filter must not be empty".to_string()));
        }
        Ok(())
    }

    /// The configured database file, or the platform default.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.storage.database {
            return Ok(path.clone());
        }
        let dirs = project_dirs().ok_or_raise(|| ErrorKind::NoHomeDirectory)?;
        Ok(dirs.data_dir().join(DATABASE_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn from_toml(toml: &str) -> Result<Config> {
        Config::from_figment(Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)))
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache.freshness(), Duration::from_secs(5));
        assert!(config.staging.sweep_on_open);
        assert_eq!(config.staging.orphan_age(), Duration::from_secs(3600));
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn test_partial_override() {
        let config = from_toml(
            r#"
                [storage]
                database = "/tmp/hearth-test.sqlite3"

                [staging]
                sweep_on_open = false
            "#,
        )
        .unwrap();
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/hearth-test.sqlite3"));
        assert_eq!(config.storage.max_connections, 4);
        assert!(!config.staging.sweep_on_open);
        assert_eq!(config.staging.orphan_age_secs, 3600);
    }

    #[rstest]
    #[case("[storage]\nmax_connections = 0")]
    #[case("[storage]\ndatabase = \"\"")]
    #[case("[log]\nfilter = \"  \"")]
    fn test_invalid(#[case] toml: &str) {
        let err = from_toml(toml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[rstest]
    #[case("[storage]\nmax_connections = \"many\"")]
    #[case("[cache]\nfreshness_ms = -1")]
    fn test_unloadable(#[case] toml: &str) {
        let err = from_toml(toml).unwrap_err();
        assert_eq!(*err, ErrorKind::Load);
    }

    #[test]
    fn test_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\nfreshness_ms = 250").unwrap();
        let figment = Config::figment(Some(file.path())).unwrap();
        let config: Config = figment.extract().unwrap();
        assert_eq!(config.cache.freshness(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = Config::figment(Some(&path)).unwrap_err();
        assert_eq!(*err, ErrorKind::MissingFile(path));
    }
}
