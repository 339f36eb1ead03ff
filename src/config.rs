//! Layered configuration: built-in defaults, then `gearguard.toml`,
//! then `GEARGUARD_*` environment variables. CLI flags are merged on
//! top in `main`. The JWT signing secret never lives in the file; it
//! is read from the `JWT_SECRET` environment variable only.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "gearguard.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub auth: AuthSection,
    pub requests: RequestsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub dev_mode: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            request_timeout_secs: 30,
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".gearguard/gearguard.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub token_ttl_days: i64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self { token_ttl_days: 7 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestsSection {
    pub strict_transitions: bool,
}

impl AppConfig {
    /// Load from an explicit path, or from `gearguard.toml` in the
    /// working directory when present, then apply environment
    /// overrides. An explicit path that does not exist is an error; a
    /// missing default file is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("GEARGUARD_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("GEARGUARD_PORT") {
            self.server.port = port
                .parse()
                .context("GEARGUARD_PORT must be a port number")?;
        }
        if let Ok(path) = std::env::var("GEARGUARD_DB") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(days) = std::env::var("GEARGUARD_TOKEN_TTL_DAYS") {
            self.auth.token_ttl_days = days
                .parse()
                .context("GEARGUARD_TOKEN_TTL_DAYS must be a number of days")?;
        }
        if let Ok(strict) = std::env::var("GEARGUARD_STRICT_TRANSITIONS") {
            self.requests.strict_transitions = matches!(strict.as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// The signing secret comes only from the environment, never from
    /// the config file, so it cannot end up committed by accident.
    pub fn jwt_secret() -> Option<String> {
        std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty())
    }
}
