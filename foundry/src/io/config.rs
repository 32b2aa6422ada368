//! Foundry configuration stored under `<home>/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::atomic::write_atomic;

/// Foundry configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// values suitable for a small team of agents polling every 30 seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FoundryConfig {
    /// Upper bound on loop iterations per agent process.
    pub max_iterations: u32,

    /// Seconds an agent sleeps between polls while it has nothing to do.
    pub poll_interval_secs: u64,

    /// Seconds without a heartbeat before `foundry status` reports an agent as stale.
    pub stale_threshold_secs: u64,

    pub engine: EngineConfig,

    pub classifier: ClassifierConfig,
}

/// How to launch the conversational engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Program and leading arguments (e.g. `["claude"]`).
    pub command: Vec<String>,
    /// Tools the engine may use during a turn.
    pub allowed_tools: Vec<String>,
    pub permission_mode: String,
    pub model: Option<String>,
}

/// How to classify replies that wait for a human.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Program used for classification. Empty uses the local heuristic only.
    pub command: Vec<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string()],
            allowed_tools: ["Read", "Edit", "Glob", "Write", "Bash", "Grep"]
                .into_iter()
                .map(String::from)
                .collect(),
            permission_mode: "acceptEdits".to_string(),
            model: None,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string()],
            model: "haiku".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for FoundryConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            poll_interval_secs: 30,
            stale_threshold_secs: 300,
            engine: EngineConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl FoundryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.stale_threshold_secs == 0 {
            return Err(anyhow!("stale_threshold_secs must be > 0"));
        }
        if self.engine.command.is_empty() || self.engine.command[0].trim().is_empty() {
            return Err(anyhow!("engine.command must be a non-empty array"));
        }
        if self
            .classifier
            .command
            .first()
            .is_some_and(|program| program.trim().is_empty())
        {
            return Err(anyhow!("classifier.command must not start with an empty program"));
        }
        if self.classifier.timeout_secs == 0 {
            return Err(anyhow!("classifier.timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FoundryConfig::default()`.
pub fn load_config(path: &Path) -> Result<FoundryConfig> {
    if !path.exists() {
        let cfg = FoundryConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FoundryConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FoundryConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
