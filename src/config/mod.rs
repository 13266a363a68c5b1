//! Configuration module - environment variable parsing and simulation tunables

mod tuning;

pub use tuning::{BlockWindows, GameConfig, PhysicsTuning, ProjectileTuning};

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::util::time::DEFAULT_TICK_SPEED;

/// Hard cap on connected clients (client masks are 64 bits wide)
pub const MAX_CLIENTS: usize = 64;

/// Server configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of the human readable format
    pub log_json: bool,
    /// Simulation ticks per second
    pub tick_speed: i64,
    /// Snapshots sent per second
    pub snapshot_rate: u32,
    /// Optional JSON file overriding the default game tunables
    pub game_config_path: Option<PathBuf>,
    /// Optional ASCII map, the built-in arena is used otherwise
    pub map_path: Option<PathBuf>,
    /// Seed for spawn point selection
    pub world_seed: u64,
    pub max_clients: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let tick_speed = parse_var("TICK_SPEED", DEFAULT_TICK_SPEED)?;
        if tick_speed <= 0 {
            return Err(ConfigError::Invalid {
                var: "TICK_SPEED",
                value: tick_speed.to_string(),
            });
        }

        let snapshot_rate: u32 = parse_var("SNAPSHOT_RATE", 25)?;
        let max_clients: usize = parse_var("MAX_CLIENTS", MAX_CLIENTS)?;

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")),
            tick_speed,
            snapshot_rate: snapshot_rate.clamp(1, tick_speed as u32),
            game_config_path: env::var("GAME_CONFIG_PATH").ok().map(PathBuf::from),
            map_path: env::var("MAP_PATH").ok().map(PathBuf::from),
            world_seed: parse_var("WORLD_SEED", rand::random::<u64>())?,
            max_clients: max_clients.clamp(1, MAX_CLIENTS),
        })
    }

    /// Load the game tunables, falling back to defaults when no file is configured
    pub fn load_game_config(&self) -> Result<GameConfig, ConfigError> {
        match &self.game_config_path {
            Some(path) => GameConfig::from_file(path),
            None => Ok(GameConfig::default()),
        }
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed game config: {0}")]
    Parse(#[from] serde_json::Error),
}
