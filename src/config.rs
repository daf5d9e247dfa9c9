//! Engine configuration and fleet file loading
//!
//! A fleet file is TOML:
//! ```toml
//! [engine]
//! workers = 10
//! connect_timeout_ms = 10000
//! read_timeout_ms = 20000
//! history_path = "cmdfleet-history.jsonl"
//!
//! [[devices]]
//! name = "sw1"
//! address = "10.0.0.1"
//! platform = "cisco_ios"
//! username = "admin"
//! password = "admin"
//! secret = "enable"
//!
//! [[groups]]
//! name = "core"
//! members = ["sw1"]
//! ```

use anyhow::{bail, Context, Result};
use cmdfleet_shared::defaults;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::inventory::{DeviceEntry, GroupEntry, StaticInventory};

/// Environment variable naming the fleet file when `--inventory` is absent
pub const INVENTORY_ENV: &str = "CMDFLEET_INVENTORY";

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Concurrent device sessions for parallel dispatches
    pub workers: usize,
    /// Session connect timeout
    pub connect_timeout: Duration,
    /// Longest wait for a device to answer with a prompt
    pub read_timeout: Duration,
    /// JSON-lines history file
    pub history_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: defaults::CONCURRENCY_LIMIT,
            connect_timeout: Duration::from_millis(defaults::CONNECT_TIMEOUT_MS),
            read_timeout: Duration::from_millis(defaults::READ_TIMEOUT_MS),
            history_path: PathBuf::from("cmdfleet-history.jsonl"),
        }
    }
}

/// `[engine]` table; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    pub workers: Option<usize>,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub history_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Override defaults with the keys present in `section`
    pub fn apply(&mut self, section: &EngineSection) {
        if let Some(workers) = section.workers {
            self.workers = workers;
        }
        if let Some(ms) = section.connect_timeout_ms {
            self.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = section.read_timeout_ms {
            self.read_timeout = Duration::from_millis(ms);
        }
        if let Some(path) = &section.history_path {
            self.history_path = path.clone();
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FleetFile {
    #[serde(default)]
    engine: EngineSection,
    #[serde(default)]
    devices: Vec<DeviceEntry>,
    #[serde(default)]
    groups: Vec<GroupEntry>,
}

/// Engine settings plus inventory, as loaded from a fleet file
#[derive(Debug, Clone)]
pub struct Fleet {
    pub engine: EngineConfig,
    pub inventory: StaticInventory,
}

impl Fleet {
    /// Parse fleet file contents
    pub fn parse(text: &str) -> Result<Self> {
        let file: FleetFile = toml::from_str(text).context("Invalid fleet file")?;

        let mut engine = EngineConfig::default();
        engine.apply(&file.engine);
        if engine.workers == 0 {
            bail!("[engine] workers must be at least 1");
        }

        let inventory = StaticInventory::from_entries(file.devices, file.groups)
            .context("Invalid inventory")?;

        Ok(Self { engine, inventory })
    }

    /// Read and parse a fleet file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fleet file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to load {}", path.display()))
    }
}
