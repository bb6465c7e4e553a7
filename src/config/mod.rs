// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{GateError, Result};
use config::{Config, Environment, File};
use std::path::PathBuf;

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. CLI arguments (highest, applied by the caller)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Same as [`AppConfig::load`] but reading the file at `path`.
    /// A missing file is not an error.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name(path).required(false))
            // Override with environment variables (prefix: DASHGATE_, nested with __)
            .add_source(
                Environment::with_prefix("DASHGATE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("offline.static_assets")
                    .with_list_parse_key("offline.network_only_prefixes")
                    .with_list_parse_key("offline.network_only_hosts")
                    .with_list_parse_key("guard.bypass_prefixes")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| GateError::Config(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| GateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject path tables the guard cannot work with.
    pub fn validate(&self) -> Result<()> {
        let guard = &self.guard;
        for (name, path) in [
            ("guard.login_path", &guard.login_path),
            ("guard.dashboard_path", &guard.dashboard_path),
            ("guard.auth_prefix", &guard.auth_prefix),
            ("guard.two_factor_prefix", &guard.two_factor_prefix),
            ("guard.two_factor_challenge_path", &guard.two_factor_challenge_path),
            ("guard.two_factor_verify_endpoint", &guard.two_factor_verify_endpoint),
            ("offline.offline_page", &self.offline.offline_page),
        ] {
            if !path.starts_with('/') {
                return Err(GateError::Config(format!(
                    "{} must be an absolute path, got {:?}",
                    name, path
                )));
            }
        }

        if self.offline.cache_name.trim().is_empty() {
            return Err(GateError::Config("offline.cache_name must not be empty".to_string()));
        }

        Ok(())
    }

    /// Render the configuration as a TOML document.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| GateError::Config(e.to_string()))
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dashgate")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}
