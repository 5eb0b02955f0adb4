//! Swarm configuration.

use crate::duration::{serde_duration, serde_opt_duration};
use anyhow::Context;
use exchange_wire::{CompletionMode, DEFAULT_MAX_FRAME_LEN};
use loadtest_generator::{RequestMix, TransIdMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12345;

/// What a client does after an error that leaves its connection unusable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconnectPolicy {
    /// Open a new connection at the start of the next cycle.
    #[default]
    OnFailure,
    /// Stop the client.
    Never,
}

impl std::fmt::Display for ReconnectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconnectPolicy::OnFailure => write!(f, "on-failure"),
            ReconnectPolicy::Never => write!(f, "never"),
        }
    }
}

/// Everything needed to run a swarm of virtual clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub host: String,
    pub port: u16,
    /// Number of concurrent virtual clients.
    pub clients: usize,
    pub mix: RequestMix,
    #[serde(with = "serde_duration")]
    pub connect_timeout: Duration,
    /// Deadline for one whole request/response exchange.
    #[serde(with = "serde_duration")]
    pub read_timeout: Duration,
    /// Pause between cycles of one client.
    #[serde(with = "serde_duration")]
    pub think_time: Duration,
    /// Wall-clock limit for the run. Unlimited when absent.
    #[serde(with = "serde_opt_duration", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests_per_client: Option<u64>,
    pub seed: u64,
    pub completion: CompletionMode,
    pub max_frame_len: usize,
    pub trans_ids: TransIdMode,
    pub reconnect: ReconnectPolicy,
    #[serde(with = "serde_duration")]
    pub reconnect_backoff: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            clients: 10,
            mix: RequestMix::default(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            think_time: Duration::ZERO,
            duration: None,
            max_requests_per_client: None,
            seed: 42,
            completion: CompletionMode::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            trans_ids: TransIdMode::default(),
            reconnect: ReconnectPolicy::default(),
            reconnect_backoff: Duration::from_millis(500),
        }
    }
}

impl SwarmConfig {
    /// Load a config from a YAML file. Missing fields take their defaults.
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: SwarmConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Reject configurations that cannot produce any traffic.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.clients == 0 {
            anyhow::bail!("clients must be at least 1");
        }
        if self.port == 0 {
            anyhow::bail!("port must not be 0");
        }
        if self.mix.total() == 0 {
            anyhow::bail!("request mix must have at least one non-zero weight");
        }
        if self.read_timeout.is_zero() {
            anyhow::bail!("read_timeout must be greater than zero");
        }
        if self.max_frame_len == 0 {
            anyhow::bail!("max_frame_len must be greater than zero");
        }
        Ok(())
    }

    /// Seed for one client's payload generator.
    pub fn client_seed(&self, client_index: usize) -> u64 {
        self.seed.wrapping_add(client_index as u64)
    }
}
