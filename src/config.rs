//! Kernel configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists. A few values can be overridden from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use timewolf_runner::{RunnerConfig, DEFAULT_POOL_SIZE};

pub const DEFAULT_CONFIG_FILE: &str = "timewolf.toml";
pub const ENV_POOL_SIZE: &str = "TIMEWOLF_POOL_SIZE";
pub const ENV_LOG: &str = "TIMEWOLF_LOG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub runner: RunnerSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    /// Worker pool size per Process stage.
    pub pool_size: usize,
    /// Per-item timeout in seconds. 0 disables it.
    pub item_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            item_timeout_secs: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "timewolf=info".to_string(),
            json: false,
        }
    }
}

impl KernelConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content)
                .with_context(|| format!("Failed to parse {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// `load` followed by the process environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies `TIMEWOLF_POOL_SIZE` and `TIMEWOLF_LOG` as returned by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_POOL_SIZE) {
            self.runner.pool_size = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got {:?}", ENV_POOL_SIZE, raw))?;
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|f| !f.trim().is_empty()) {
            self.logging.filter = filter;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.runner.pool_size == 0 {
            anyhow::bail!("runner.pool_size must be at least 1");
        }
        Ok(())
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            pool_size: self.runner.pool_size,
            item_timeout: match self.runner.item_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
