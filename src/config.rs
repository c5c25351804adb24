use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, SupervisionError};

/// Settings of the supervision loop.
#[derive(Debug, Clone)]
pub struct SupervisionConfig {
    /// Root of the cluster's key space in the agency, e.g. `/arango`
    pub prefix: String,
    pub tick_interval_ms: u64,
    /// Recorded as `creator` on jobs this supervisor creates
    pub creator: String,
    /// Pins follower selection for reproducible runs
    pub rng_seed: Option<u64>,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            prefix: "/arango".to_string(),
            tick_interval_ms: 1000,
            creator: "supervision".to_string(),
            rng_seed: None,
        }
    }
}

impl SupervisionConfig {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            ..Default::default()
        }
    }

    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    pub fn with_creator(mut self, creator: &str) -> Self {
        self.creator = creator.to_string();
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub supervision: SupervisionConfig,
    /// Dashboard and agency HTTP API; disabled when unset
    pub dashboard_addr: Option<SocketAddr>,
    /// JSON file holding the initial agency tree
    pub state_file: Option<PathBuf>,
}

impl NodeConfig {
    pub fn new(supervision: SupervisionConfig) -> Self {
        Self {
            supervision,
            ..Default::default()
        }
    }

    pub fn with_dashboard(mut self, addr: SocketAddr) -> Self {
        self.dashboard_addr = Some(addr);
        self
    }

    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }
}

/// Reads an agency tree from a JSON file. The top level must be an object.
pub fn load_state_file(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)?;
    let tree: Value = serde_json::from_str(&raw)?;
    if !tree.is_object() {
        return Err(SupervisionError::malformed(path.display().to_string(), "JSON object"));
    }
    Ok(tree)
}
