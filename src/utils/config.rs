use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which executor runs scenarios
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Evaluate steps against the scenario's HTML source
    #[default]
    Static,
    /// Only validate steps; every run is recorded as `error`
    Validate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8009,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database URL: `sqlite://...`, `sqlite::memory:` or `memory://`
    pub database: String,

    pub executor: ExecutorKind,

    /// Window for confirming a step delete with a second press (ms)
    pub delete_confirm_window_ms: u64,

    /// Where executors write failure artifacts
    pub screenshots_dir: PathBuf,

    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            executor: ExecutorKind::Static,
            delete_confirm_window_ms: 3000,
            screenshots_dir: PathBuf::from("./output/screenshots"),
            server: ServerConfig::default(),
        }
    }
}

fn default_database() -> String {
    match dirs::data_dir() {
        Some(dir) => format!(
            "sqlite://{}",
            dir.join("test-builder").join("test-builder.db").display()
        ),
        None => "sqlite://./test-builder.db".to_string(),
    }
}

impl Config {
    /// Load from a YAML file, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn delete_confirm_window(&self) -> Duration {
        Duration::from_millis(self.delete_confirm_window_ms)
    }
}
