// Node configuration - one struct composing every component's settings

use crate::network::{NetworkConfig, NetworkError};
use crate::protocol::{AggregatorConfig, AggregatorConfigError, StreamerConfig, StreamerConfigError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Network: {0}")]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Streamer(#[from] StreamerConfigError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorConfigError),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Everything needed to bring up a node
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Where the store lives; a temporary store is used when unset
    pub data_dir: Option<PathBuf>,
    pub network: NetworkConfig,
    pub streamer: StreamerConfig,
    pub aggregator: AggregatorConfig,
    /// Pause between announcing a set and streaming its files
    pub announce_grace: Duration,
    /// How often idle pending sets are swept
    pub sweep_interval: Duration,
    /// Completed-set notifications buffered for the owner of the node
    pub completion_buffer: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            network: NetworkConfig::default(),
            streamer: StreamerConfig::default(),
            aggregator: AggregatorConfig::default(),
            announce_grace: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(30),
            completion_buffer: 256,
        }
    }
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_streamer(mut self, streamer: StreamerConfig) -> Self {
        self.streamer = streamer;
        self
    }

    pub fn with_aggregator(mut self, aggregator: AggregatorConfig) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_announce_grace(mut self, grace: Duration) -> Self {
        self.announce_grace = grace;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Validate this config and every nested one
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.validate()?;
        self.streamer.validate()?;
        self.aggregator.validate()?;
        // A bucket swept while its set is still streaming can never complete
        if self.aggregator.pending_ttl < self.streamer.set_idle_timeout {
            return Err(ConfigError::InvalidValue(
                "aggregator pending_ttl must not be shorter than streamer set_idle_timeout".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "sweep_interval must be positive".to_string(),
            ));
        }
        if self.completion_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "completion_buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
