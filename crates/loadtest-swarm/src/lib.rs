//! Virtual-client swarms for exchange load testing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         run_swarm                             │
//! │         (duration timer, Ctrl-C, startup failure count)       │
//! └──────────────────────────────────────────────────────────────┘
//!                                 │ spawns N
//!             ┌───────────────────┼───────────────────┐
//!             ▼                   ▼                   ▼
//!     ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//!     │ VirtualClient│    │ VirtualClient│    │ VirtualClient│
//!     │  generator   │    │  generator   │    │  generator   │
//!     │  connection  │    │  connection  │    │  connection  │
//!     └──────────────┘    └──────────────┘    └──────────────┘
//!             │ one outcome per cycle                 │
//!             └───────────────────┬───────────────────┘
//!                                 ▼
//!                  ┌──────────────────────────────┐
//!                  │  MetricsRecorder (shared)     │
//!                  │  ChannelRecorder -> Aggregator│
//!                  └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! exchange-loadtest run --host 127.0.0.1 --port 12345 -n 50 --duration 30s
//! ```

pub mod aggregator;
pub mod cli;
pub mod client;
pub mod config;
pub mod duration;
pub mod metrics;
pub mod swarm;

pub use aggregator::{
    format_json, format_markdown, format_table, Aggregator, KindStats, LatencyStats, SwarmReport,
};
pub use cli::{OutputFormat, RunArgs};
pub use client::{
    ClientError, ClientSettings, ClientState, ClientSummary, Connector, StopReason, TcpConnector,
    VirtualClient,
};
pub use config::{ReconnectPolicy, SwarmConfig};
pub use metrics::{
    ChannelRecorder, CountingRecorder, FanoutRecorder, MetricsEvent, MetricsRecorder,
    ResponseOutcome,
};
pub use swarm::{run_swarm, run_swarm_until, SwarmOutcome};
