//! Deskclaw configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DeskclawError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskclawConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Default for DeskclawConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            queue: QueueConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl DeskclawConfig {
    /// Load config from the default path (~/.deskclaw/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeskclawError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DeskclawError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| DeskclawError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Deskclaw home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".deskclaw")
    }
}

/// Scheduler (recurring prompts) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-checks. Sub-minute precision is not a goal;
    /// extra ticks simply find nothing due.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Maximum retained execution-history records (oldest dropped first).
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Directory for schedule record files (default: ~/.deskclaw/automation).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_tick_secs() -> u64 { 60 }
fn default_history_cap() -> usize { 100 }
fn default_data_dir() -> String { "~/.deskclaw/automation".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            history_cap: default_history_cap(),
            data_dir: default_data_dir(),
        }
    }
}

/// Task queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Failures tolerated before a task is failed permanently.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before a failed task is eligible for reclaim.
    /// 0 = immediate redelivery.
    #[serde(default)]
    pub retry_backoff_secs: u64,
    /// Seconds between deadline sweeps.
    #[serde(default = "default_sweep_secs")]
    pub deadline_sweep_secs: u64,
    /// Terminal tasks older than this are removed by cleanup.
    #[serde(default = "default_cleanup_age")]
    pub cleanup_age_secs: u64,
}

fn default_max_retries() -> u32 { 3 }
fn default_sweep_secs() -> u64 { 30 }
fn default_cleanup_age() -> u64 { 7 * 24 * 3600 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_secs: 0,
            deadline_sweep_secs: default_sweep_secs(),
            cleanup_age_secs: default_cleanup_age(),
        }
    }
}

/// Local assistant agent endpoint — where fired prompts are delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_url")]
    pub url: String,
    /// Seconds to wait for the agent before recording a failure.
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
}

fn default_agent_url() -> String { "http://127.0.0.1:4520/api/agent/run".into() }
fn default_agent_timeout() -> u64 { 30 }

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: default_agent_url(),
            timeout_secs: default_agent_timeout(),
        }
    }
}
