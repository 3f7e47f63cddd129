//! Daemon configuration.
//!
//! Read from the TOML file named by `MUSTER_CONFIG`. Every section is
//! optional and falls back to its defaults.

use std::path::Path;

use muster_db::DbConfig;
use muster_engine::EngineConfig;
use serde::Deserialize;

use crate::error::ServerError;

pub const CONFIG_ENV: &str = "MUSTER_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Load from `MUSTER_CONFIG` if set, otherwise use defaults.
    pub fn load() -> Result<Self, ServerError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ServerError> {
        Ok(toml::from_str(raw)?)
    }
}
