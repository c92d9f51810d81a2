//! Server configuration.
//!
//! Defaults merged with `CHORUS_*` environment variables; `DATABASE_URL`
//! is honored directly as the conventional override.

use anyhow::{Context, Result};
use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:.chorus/chorus.db".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Config {
    /// Load configuration: programmatic defaults, then `CHORUS_*`
    /// environment variables, then `DATABASE_URL` (highest priority).
    pub fn load() -> Result<Self> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("CHORUS_"))
            .extract()
            .context("Failed to extract configuration from environment")?;

        if let Ok(database_url) = std::env::var("DATABASE_URL") {
            config.database_url = database_url;
        }
        Ok(config)
    }
}
