use anyhow::Context;
use dbadmin_core::ToolConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Backup root used when a request names no location.
    #[serde(default = "default_backups_dir")]
    pub backups_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub tools: ToolConfig,
    #[serde(default)]
    pub log: LogSection,
}

fn default_port() -> u16 {
    3000
}

fn default_backups_dir() -> PathBuf {
    PathBuf::from("/backup/data/backups")
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            backups_dir: default_backups_dir(),
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Reads the TOML file if given, then applies `PORT`, `BACKUPS_DIR` and
    /// `LOG_LEVEL` from the environment (and `.env`).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(dir) = var("BACKUPS_DIR") {
            self.server.backups_dir = PathBuf::from(dir);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log.level = level;
        }
    }
}
