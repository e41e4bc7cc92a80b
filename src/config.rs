//! Configuration management for anchorchain

use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_data_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_data_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    /// Blocks between durable snapshot checkpoints.
    #[serde(default = "default_interval_blocks")]
    pub interval_blocks: u64,
    /// Bounded depth of the pending-checkpoint queue; producers drop
    /// instead of blocking when it fills.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { interval_blocks: default_interval_blocks(), queue_depth: default_queue_depth() }
    }
}

pub fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    let config_str = fs::read_to_string("config.toml").unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        Config { database: DatabaseConfig::default(), checkpoint: CheckpointConfig::default() }
    } else {
        toml::from_str(&config_str)?
    };

    if config.database.path.is_empty() {
        return Err("database.path must be set in config.toml".into());
    }

    if config.checkpoint.interval_blocks == 0 {
        return Err("checkpoint.interval_blocks must be at least 1".into());
    }

    if config.checkpoint.queue_depth == 0 {
        return Err("checkpoint.queue_depth must be at least 1".into());
    }

    Ok(config)
}

fn default_data_path() -> String {
    "./data/chain.db".to_string()
}

fn default_interval_blocks() -> u64 {
    100
}

fn default_queue_depth() -> usize {
    4
}
