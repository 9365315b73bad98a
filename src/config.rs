// Node configuration

use crate::consensus::FixedPolicy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// `host:port` to accept peers on
    pub listen: String,
    /// Bootstrap peers, `host:port`
    pub peers: Vec<String>,
    pub consensus: ConsensusConfig,
    pub network: NetworkConfig,
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub difficulty: u32,
    pub mining_reward: f64,
    /// Shared by every node so they agree on the chain root
    pub genesis_timestamp: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub max_frame_bytes: usize,
    pub connect_timeout_ms: u64,
    /// Upper bound for receiving the rest of a frame once it has started
    pub frame_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Frames buffered per peer before new ones are dropped
    pub outbound_queue: usize,
    pub seen_cache_size: usize,
    pub max_peers: usize,
    /// Re-check signatures of transactions relayed by peers
    pub verify_relayed_transactions: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Reward address for the auto-mining loop
    pub address: Option<String>,
    /// Mine every `interval_secs` when set together with `address`
    pub interval_secs: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:5000".to_string(),
            peers: Vec::new(),
            consensus: ConsensusConfig::default(),
            network: NetworkConfig::default(),
            miner: MinerConfig::default(),
        }
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            difficulty: 4,
            mining_reward: 10.0,
            genesis_timestamp: 0.0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 8 * 1024 * 1024,
            connect_timeout_ms: 5_000,
            frame_timeout_ms: 10_000,
            write_timeout_ms: 5_000,
            outbound_queue: 256,
            seen_cache_size: 4_096,
            max_peers: 64,
            verify_relayed_transactions: true,
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl NodeConfig {
    /// Load from a TOML file; missing keys fall back to defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check critical values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let consensus = &self.consensus;
        if consensus.difficulty == 0 || consensus.difficulty > 64 {
            return Err(ConfigError::Invalid(format!(
                "consensus.difficulty must be within 1..=64, got {}",
                consensus.difficulty
            )));
        }
        if !consensus.mining_reward.is_finite() || consensus.mining_reward < 0.0 {
            return Err(ConfigError::Invalid(
                "consensus.mining_reward must be a non-negative number".into(),
            ));
        }
        if self.network.max_frame_bytes == 0 || self.network.outbound_queue == 0 {
            return Err(ConfigError::Invalid(
                "network.max_frame_bytes and network.outbound_queue must be positive".into(),
            ));
        }
        if self.miner.interval_secs == Some(0) {
            return Err(ConfigError::Invalid("miner.interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Consensus policy described by this config
    pub fn policy(&self) -> FixedPolicy {
        FixedPolicy::new(self.consensus.difficulty, self.consensus.mining_reward)
    }
}
