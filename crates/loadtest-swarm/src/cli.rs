//! CLI argument definitions for swarm runs.

use crate::config::{ReconnectPolicy, SwarmConfig};
use crate::duration::parse_duration;
use clap::{Args, ValueEnum};
use exchange_wire::CompletionMode;
use loadtest_generator::{RequestMix, TransIdMode};
use std::path::PathBuf;
use std::time::Duration;

/// Output format for the run report.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
    Markdown,
}

/// Response completion mode for CLI.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CompletionChoice {
    Auto,
    Marker,
    LengthPrefix,
}

impl From<CompletionChoice> for CompletionMode {
    fn from(choice: CompletionChoice) -> Self {
        match choice {
            CompletionChoice::Auto => CompletionMode::Auto,
            CompletionChoice::Marker => CompletionMode::Marker,
            CompletionChoice::LengthPrefix => CompletionMode::LengthPrefix,
        }
    }
}

/// Transaction id mode for CLI.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TransIdChoice {
    Independent,
    Correlated,
}

impl From<TransIdChoice> for TransIdMode {
    fn from(choice: TransIdChoice) -> Self {
        match choice {
            TransIdChoice::Independent => TransIdMode::Independent,
            TransIdChoice::Correlated => TransIdMode::Correlated,
        }
    }
}

/// Reconnect policy for CLI.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReconnectChoice {
    OnFailure,
    Never,
}

impl From<ReconnectChoice> for ReconnectPolicy {
    fn from(choice: ReconnectChoice) -> Self {
        match choice {
            ReconnectChoice::OnFailure => ReconnectPolicy::OnFailure,
            ReconnectChoice::Never => ReconnectPolicy::Never,
        }
    }
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

/// Arguments for the run command.
///
/// Every field except `config` and `output` overrides the matching value
/// from the config file, or the default when no file is given.
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// YAML config file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Exchange server host
    #[arg(long, env = "EXCHANGE_HOST")]
    pub host: Option<String>,

    /// Exchange server port
    #[arg(long, env = "EXCHANGE_PORT")]
    pub port: Option<u16>,

    /// Number of concurrent virtual clients
    #[arg(long, short = 'n')]
    pub clients: Option<usize>,

    /// Request weights as CREATE:TRANSACTION (e.g. 1:3)
    #[arg(long)]
    pub mix: Option<RequestMix>,

    /// Connect timeout (e.g. 5s, 500ms)
    #[arg(long, value_parser = duration_arg)]
    pub connect_timeout: Option<Duration>,

    /// Deadline for one request/response exchange
    #[arg(long, value_parser = duration_arg)]
    pub read_timeout: Option<Duration>,

    /// Pause between requests of one client
    #[arg(long, value_parser = duration_arg)]
    pub think_time: Option<Duration>,

    /// Stop the run after this long (e.g. 30s, 5m)
    #[arg(long, short = 'd', value_parser = duration_arg)]
    pub duration: Option<Duration>,

    /// Stop each client after this many requests
    #[arg(long)]
    pub max_requests: Option<u64>,

    /// Base seed; client N uses seed + N
    #[arg(long)]
    pub seed: Option<u64>,

    /// How to recognize the end of a response
    #[arg(long)]
    pub completion: Option<CompletionChoice>,

    /// Largest accepted length-prefixed response, in bytes
    #[arg(long)]
    pub max_frame_len: Option<usize>,

    /// How query/cancel ids relate to order ids
    #[arg(long)]
    pub trans_ids: Option<TransIdChoice>,

    /// What to do after a connection breaks
    #[arg(long)]
    pub reconnect: Option<ReconnectChoice>,

    /// Delay before reconnecting
    #[arg(long, value_parser = duration_arg)]
    pub reconnect_backoff: Option<Duration>,

    /// Report format
    #[arg(long, short = 'o', default_value = "table")]
    pub output: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(long)]
    pub report_file: Option<PathBuf>,
}

impl RunArgs {
    /// Build the effective config: file (or defaults), then CLI overrides.
    pub fn to_config(&self) -> anyhow::Result<SwarmConfig> {
        let mut config = match &self.config {
            Some(path) => SwarmConfig::from_yaml_file(path)?,
            None => SwarmConfig::default(),
        };

        if let Some(ref host) = self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(clients) = self.clients {
            config.clients = clients;
        }
        if let Some(mix) = self.mix {
            config.mix = mix;
        }
        if let Some(d) = self.connect_timeout {
            config.connect_timeout = d;
        }
        if let Some(d) = self.read_timeout {
            config.read_timeout = d;
        }
        if let Some(d) = self.think_time {
            config.think_time = d;
        }
        if let Some(d) = self.duration {
            config.duration = Some(d);
        }
        if let Some(n) = self.max_requests {
            config.max_requests_per_client = Some(n);
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(choice) = self.completion {
            config.completion = choice.into();
        }
        if let Some(len) = self.max_frame_len {
            config.max_frame_len = len;
        }
        if let Some(choice) = self.trans_ids {
            config.trans_ids = choice.into();
        }
        if let Some(choice) = self.reconnect {
            config.reconnect = choice.into();
        }
        if let Some(d) = self.reconnect_backoff {
            config.reconnect_backoff = d;
        }

        config.validate()?;
        Ok(config)
    }
}
