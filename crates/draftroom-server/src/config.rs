// Configuration loading and parsing (config/draftroom.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use thiserror::Error;
use tracing::info;

use draftroom_core::gateway::RetryPolicy;
use draftroom_core::services::LeagueSettings;
use draftroom_core::EngineSettings;

/// Name of the single config file under `config/` and `defaults/`.
pub const CONFIG_FILE: &str = "draftroom.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("no config at {config} and no shipped default at {defaults}")]
    NoConfig { config: PathBuf, defaults: PathBuf },

    #[error("failed to install default config at {path}: {source}")]
    InstallError {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub leagues: Vec<LeagueSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub ws_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, or `":memory:"` for a throwaway run.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub deadline_grace_ms: u64,
    #[serde(default = "default_max_transition_attempts")]
    pub max_transition_attempts: u32,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            deadline_grace_ms: 0,
            max_transition_attempts: default_max_transition_attempts(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Player pool CSV, relative to the working directory.
    pub players: String,
}

fn default_max_transition_attempts() -> u32 {
    8
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    50
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            deadline_grace: chrono::Duration::milliseconds(self.engine.deadline_grace_ms as i64),
            max_transition_attempts: self.engine.max_transition_attempts,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.gateway.retry_attempts,
            base_delay: StdDuration::from_millis(self.gateway.retry_base_delay_ms),
        }
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.engine.sweep_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load and validate `config/draftroom.toml` under `base_dir`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let config = parse_config(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    validate(&config)?;

    Ok(config)
}

pub fn parse_config(text: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(text)
}

/// Load `config/draftroom.toml` under `base_dir`. On first run, when that
/// file does not exist yet, the shipped `defaults/draftroom.toml` is copied
/// into place so operators have a file to edit. An existing config is never
/// touched.
pub fn load_config_in(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_path = base_dir.join("config").join(CONFIG_FILE);
    if !config_path.exists() {
        let defaults = base_dir.join("defaults").join(CONFIG_FILE);
        if !defaults.is_file() {
            return Err(ConfigError::NoConfig {
                config: config_path,
                defaults,
            });
        }
        install_default(&defaults, &config_path)?;
        info!("Installed default config at {}", config_path.display());
    }
    load_config_from(base_dir)
}

fn install_default(defaults: &Path, target: &Path) -> Result<(), ConfigError> {
    let install_error = |source| ConfigError::InstallError {
        path: target.to_path_buf(),
        source,
    };
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(install_error)?;
    }
    std::fs::copy(defaults, target).map_err(install_error)?;
    Ok(())
}

/// Loads config relative to the current working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    load_config_in(&cwd)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.ws_port == 0 {
        return Err(invalid("server.ws_port", "must be greater than 0"));
    }
    if config.engine.max_transition_attempts == 0 {
        return Err(invalid("engine.max_transition_attempts", "must be greater than 0"));
    }
    if config.engine.sweep_interval_ms == 0 {
        return Err(invalid("engine.sweep_interval_ms", "must be greater than 0"));
    }
    if config.gateway.retry_attempts == 0 {
        return Err(invalid("gateway.retry_attempts", "must be greater than 0"));
    }

    let mut seen = std::collections::HashSet::new();
    for league in &config.leagues {
        let id = &league.league_id;
        if !seen.insert(id.as_str()) {
            return Err(invalid("leagues.league_id", format!("duplicate league `{id}`")));
        }
        if league.team_ids.is_empty() {
            return Err(invalid(format!("leagues.{id}.team_ids"), "must not be empty"));
        }
        if league.total_rounds == 0 {
            return Err(invalid(format!("leagues.{id}.total_rounds"), "must be greater than 0"));
        }
        if league.pick_time_seconds == 0 {
            return Err(invalid(
                format!("leagues.{id}.pick_time_seconds"),
                "must be greater than 0",
            ));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
