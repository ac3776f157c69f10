use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::achievements::AchievementConfig;
use crate::ledger::LedgerConfig;

pub const CONFIG_ENV: &str = "SCOREBOARD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "scoreboard.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub bind_address: String,
    pub port: u16,
    pub store_path: PathBuf,
    pub rooms: Vec<String>,
    pub log_level: String,
    pub ledger: LedgerConfig,
    pub achievements: AchievementConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            store_path: PathBuf::from("data/scoreboard.csv"),
            rooms: vec!["ม.1/1".to_string(), "ม.1/2".to_string(), "ม.1/10".to_string()],
            log_level: "info".to_string(),
            ledger: LedgerConfig::default(),
            achievements: AchievementConfig::default(),
        }
    }
}

pub fn parse_yaml(content: &str) -> anyhow::Result<AppConfig> {
    let config: AppConfig = serde_yaml::from_str(content)?;
    Ok(config)
}

/// Load from `path`; a file that does not exist yields the defaults.
pub fn load(path: impl AsRef<Path>) -> anyhow::Result<AppConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_yaml(&content).map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))
}

/// Load from `$SCOREBOARD_CONFIG`, falling back to `scoreboard.yaml`.
pub fn load_from_env() -> anyhow::Result<AppConfig> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load(path)
}
