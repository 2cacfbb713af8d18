use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::transfer::SenderConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Rotated files to keep, unlimited if absent
    #[serde(default)]
    pub max_log_files: Option<usize>,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub chain: ChainConfig,
}

/// Simulated chain used by the bundled binary
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChainConfig {
    pub latency_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { latency_ms: 200 }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
