//! Configuration and the validation database
//!
//! Settings are read from a TOML file (explicit path, or
//! `~/.config/gdb-validator/config.toml`), then overridden by environment
//! variables (a `.env` file is honoured).

pub mod database;
pub mod repository;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use database::Database;

const APP_DIR: &str = "gdb-validator";

pub const ENV_DATABASE_URL: &str = "GDB_VALIDATOR_DATABASE_URL";
pub const ENV_BOUNDARY_ENDPOINT: &str = "GDB_VALIDATOR_BOUNDARY_ENDPOINT";
pub const ENV_EXTRACT_DIR: &str = "GDB_VALIDATOR_EXTRACT_DIR";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub boundary: BoundaryConfig,
    pub workspace: WorkspaceConfig,
    pub attributes: AttributesConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL; defaults to the user data directory
    pub url: Option<String>,
}

/// Mining-title boundary service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Query endpoint of the boundary feature service
    pub endpoint: String,
    /// Remote field holding the case code
    pub case_field: String,
    /// Local polygon feature class compared against the service
    pub layer: String,
    pub timeout_secs: u64,
    /// Maximum per-axis vertex distance for two boundaries to coincide
    pub xy_tolerance: f64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://geo.anm.gov.co/arcgis/rest/services/ANNA_Minero/MapServer/0/query"
                .to_string(),
            case_field: "CODIGO_EXPEDIENTE".to_string(),
            layer: "POLIGONO_TITULO".to_string(),
            timeout_secs: 60,
            xy_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Where archives are extracted; next to the archive when unset
    pub extract_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributesConfig {
    /// Field that must hold the run's case code on every record
    pub case_code_field: Option<String>,
    /// Values treated as empty in mandatory fields (compared case-insensitively)
    pub null_sentinels: Vec<String>,
}

impl Default for AttributesConfig {
    fn default() -> Self {
        Self {
            case_code_field: Some("EXPEDIENTE".to_string()),
            null_sentinels: vec!["NULL".to_string(), "<NULL>".to_string(), "NONE".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location if it
    /// exists, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(default) if default.is_file() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty()) {
            self.database.url = Some(url);
        }
        if let Some(endpoint) = lookup(ENV_BOUNDARY_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            self.boundary.endpoint = endpoint;
        }
        if let Some(dir) = lookup(ENV_EXTRACT_DIR).filter(|v| !v.trim().is_empty()) {
            self.workspace.extract_dir = Some(PathBuf::from(dir));
        }
    }

    /// Database URL, falling back to `<data dir>/gdb-validator/validator.db`
    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => {
                let path = dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(APP_DIR)
                    .join("validator.db");
                format!("sqlite://{}", path.display())
            }
        }
    }
}

/// `~/.config/gdb-validator/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [boundary]
            layer = "TITULO"
            xy_tolerance = 0.001

            [attributes]
            case_code_field = "COD_EXP"
            "#,
        )
        .unwrap();

        assert_eq!(config.boundary.layer, "TITULO");
        assert_eq!(config.boundary.case_field, "CODIGO_EXPEDIENTE");
        assert_eq!(config.boundary.timeout_secs, 60);
        assert_eq!(config.attributes.case_code_field.as_deref(), Some("COD_EXP"));
        assert_eq!(config.attributes.null_sentinels.len(), 3);
        assert_eq!(config.database.url, None);
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            (ENV_DATABASE_URL, "sqlite://runs.db"),
            (ENV_BOUNDARY_ENDPOINT, "http://localhost:8080/query"),
            (ENV_EXTRACT_DIR, ""),
        ]);
        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database_url(), "sqlite://runs.db");
        assert_eq!(config.boundary.endpoint, "http://localhost:8080/query");
        assert_eq!(config.workspace.extract_dir, None);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[database]\nurl = \"sqlite://x.db\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.database.url.as_deref(), Some("sqlite://x.db"));

        std::fs::write(&path, "[database\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
