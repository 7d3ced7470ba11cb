//! Layered configuration loading.

use crate::config::PlinthConfig;
use crate::error::{ConfigError, Result};
use figment::{
    providers::{Env, Format as _, Json, Serialized},
    Figment,
};
use std::path::Path;

impl PlinthConfig {
    /// Load configuration from multiple sources.
    /// Priority: CLI flags > environment variables > config file > defaults
    ///
    /// The config file is `plinth.config.json` in the project root unless a
    /// path was given with `--config`. Environment variables use the
    /// `PLINTH_` prefix, with underscores marking camelCase word breaks
    /// (`PLINTH_PORT`, `PLINTH_RELAY_PORT`).
    pub fn load(
        cwd: &Path,
        config_path: Option<&Path>,
        port: Option<u16>,
        output: Option<&Path>,
    ) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        // Load plinth.config.json if it exists
        let config_file = config_path.map(Path::to_path_buf).or_else(|| {
            let default_path = cwd.join("plinth.config.json");
            default_path.exists().then_some(default_path)
        });

        if let Some(path) = config_file {
            figment = figment.merge(Json::file(path));
        }

        // Merge environment variables (PLINTH_PORT, PLINTH_RELAY_PORT, etc.)
        figment = figment.merge(Env::prefixed("PLINTH_").map(|key| env_key(key.as_str()).into()));

        // CLI flags override everything, but only the ones actually given
        if let Some(port) = port {
            figment = figment.merge(Serialized::default("port", port));
        }
        if let Some(output) = output {
            figment = figment.merge(Serialized::default("output", output));
        }

        figment.extract().map_err(|e| {
            ConfigError::InvalidValue {
                field: "configuration".to_string(),
                value: e.to_string(),
                hint: "Check plinth.config.json syntax and field types".to_string(),
            }
            .into()
        })
    }
}

/// Map an environment variable name to its camelCase config key, so
/// `RELAY_PORT` addresses the `relayPort` field.
fn env_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut uppercase_next = false;
    for ch in name.chars() {
        if ch == '_' {
            uppercase_next = true;
        } else if uppercase_next {
            key.extend(ch.to_uppercase());
            uppercase_next = false;
        } else {
            key.extend(ch.to_lowercase());
        }
    }
    key
}
