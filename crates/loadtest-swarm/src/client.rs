//! Virtual clients.
//!
//! A virtual client owns one connection and drives request cycles over it:
//!
//! ```text
//! Idle -> Connecting -> Ready -> (Sending -> AwaitingResponse -> Ready)* -> Stopped
//! ```
//!
//! Every cycle ends with exactly one [`ResponseOutcome`] handed to the
//! recorder, whatever went wrong along the way. A client whose first connect
//! fails never enters its request loop.

use crate::config::{ReconnectPolicy, SwarmConfig};
use crate::metrics::{MetricsRecorder, ResponseOutcome};
use async_trait::async_trait;
use exchange_types::{RequestKind, Renderer, ResponseSummary, XmlRenderer};
use exchange_wire::{encode, CompletionMode, Connection, FrameDecoder, ResponseDecoder, WireError};
use loadtest_generator::{PayloadGenerator, PayloadSource, RequestMix};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Framing errors in a row after which the connection is replaced.
pub const MAX_CONSECUTIVE_FRAMING_ERRORS: u32 = 3;

/// Where a client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected. Either never started or waiting to reconnect.
    Idle,
    Connecting,
    Ready,
    /// Building and framing a request.
    Sending,
    /// Request written or being written, response not yet complete.
    AwaitingResponse,
    Stopped,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientState::Idle => write!(f, "idle"),
            ClientState::Connecting => write!(f, "connecting"),
            ClientState::Ready => write!(f, "ready"),
            ClientState::Sending => write!(f, "sending"),
            ClientState::AwaitingResponse => write!(f, "awaiting-response"),
            ClientState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Errors that end a client rather than a single request.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Client {client} failed to connect: {source}")]
    Startup {
        client: usize,
        #[source]
        source: WireError,
    },

    #[error("Client {client} cannot run a request cycle while {state}")]
    NotRunning { client: usize, state: ClientState },
}

/// Opens connections for a client.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self) -> Result<Connection<Self::Stream>, WireError>;
}

/// Connects over TCP and installs the configured response decoder.
#[derive(Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    decoder: Arc<dyn FrameDecoder>,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            decoder: Arc::new(ResponseDecoder::new(CompletionMode::default())),
        }
    }

    pub fn from_config(config: &SwarmConfig) -> Self {
        let decoder =
            ResponseDecoder::new(config.completion).with_max_frame_len(config.max_frame_len);
        Self::new(config.host.clone(), config.port, config.connect_timeout)
            .with_decoder(Arc::new(decoder))
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = decoder;
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<Connection<TcpStream>, WireError> {
        let conn = Connection::connect(&self.host, self.port, self.connect_timeout).await?;
        Ok(conn.with_decoder(self.decoder.clone()))
    }
}

/// Per-client knobs taken from [`SwarmConfig`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub mix: RequestMix,
    pub read_timeout: Duration,
    pub think_time: Duration,
    pub max_requests: Option<u64>,
    pub reconnect: ReconnectPolicy,
    pub reconnect_backoff: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from(&SwarmConfig::default())
    }
}

impl From<&SwarmConfig> for ClientSettings {
    fn from(config: &SwarmConfig) -> Self {
        Self {
            mix: config.mix,
            read_timeout: config.read_timeout,
            think_time: config.think_time,
            max_requests: config.max_requests_per_client,
            reconnect: config.reconnect,
            reconnect_backoff: config.reconnect_backoff,
        }
    }
}

/// Why a client's run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The swarm asked it to stop.
    Signalled,
    /// It issued its configured number of requests.
    RequestLimit,
    /// Its connection broke and the reconnect policy is `never`.
    ConnectionLost,
    /// `run` was called without a successful `start`.
    NotStarted,
}

/// What a client did over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSummary {
    pub client: usize,
    pub cycles: u64,
    pub reconnects: u64,
    pub stop_reason: StopReason,
}

/// One simulated user with its own connection.
pub struct VirtualClient<C: Connector, P: PayloadSource = PayloadGenerator> {
    id: usize,
    connector: C,
    source: P,
    renderer: Arc<dyn Renderer>,
    recorder: Arc<dyn MetricsRecorder>,
    settings: ClientSettings,
    state: ClientState,
    connection: Option<Connection<C::Stream>>,
    cycles: u64,
    reconnects: u64,
    framing_errors: u32,
}

impl<C: Connector, P: PayloadSource> VirtualClient<C, P> {
    pub fn new(
        id: usize,
        connector: C,
        source: P,
        recorder: Arc<dyn MetricsRecorder>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            id,
            connector,
            source,
            renderer: Arc::new(XmlRenderer::default()),
            recorder,
            settings,
            state: ClientState::Idle,
            connection: None,
            cycles: 0,
            reconnects: 0,
            framing_errors: 0,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn transition(&mut self, next: ClientState) {
        if self.state != next {
            debug!("Client {} {} -> {}", self.id, self.state, next);
            self.state = next;
        }
    }

    /// Open the client's connection. A failure here stops the client.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        if self.state != ClientState::Idle || self.cycles > 0 {
            return Err(ClientError::NotRunning {
                client: self.id,
                state: self.state,
            });
        }

        self.transition(ClientState::Connecting);
        match self.connector.connect().await {
            Ok(conn) => {
                self.connection = Some(conn);
                self.transition(ClientState::Ready);
                Ok(())
            }
            Err(source) => {
                error!("Client {} failed to connect: {}", self.id, source);
                self.transition(ClientState::Stopped);
                Err(ClientError::Startup {
                    client: self.id,
                    source,
                })
            }
        }
    }

    /// Run one request cycle and record its outcome.
    ///
    /// Request failures are not errors here: they become a failed outcome.
    /// The returned error only says the client is not in a state to run.
    pub async fn run_cycle(&mut self) -> Result<ResponseOutcome, ClientError> {
        match self.state {
            ClientState::Ready => {}
            // Disconnected after a failure; only reachable once started.
            ClientState::Idle if self.cycles > 0 => {}
            state => {
                return Err(ClientError::NotRunning {
                    client: self.id,
                    state,
                })
            }
        }

        let kind = self.source.choose_kind(&self.settings.mix);
        let started = Instant::now();
        let outcome = self.exchange(kind, started).await;

        self.cycles += 1;
        self.recorder.record(kind, outcome.clone());
        Ok(outcome)
    }

    async fn exchange(&mut self, kind: RequestKind, started: Instant) -> ResponseOutcome {
        if self.connection.is_none() {
            if let Err(e) = self.reconnect().await {
                debug!("Client {} reconnect failed: {}", self.id, e);
                return ResponseOutcome::failure(started.elapsed(), e.kind().as_str(), e);
            }
        }

        self.transition(ClientState::Sending);
        let payload = match self.source.generate(kind) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Client {} could not synthesize {}: {}", self.id, kind, e);
                self.transition(ClientState::Ready);
                return ResponseOutcome::failure(started.elapsed(), "synthesis", e);
            }
        };
        let xml = match self.renderer.render(&payload) {
            Ok(xml) => xml,
            Err(e) => {
                debug!("Client {} could not render {}: {}", self.id, kind, e);
                self.transition(ClientState::Ready);
                return ResponseOutcome::failure(started.elapsed(), "render", e);
            }
        };
        let framed = encode(&xml);

        self.transition(ClientState::AwaitingResponse);
        let Some(conn) = self.connection.as_mut() else {
            // reconnect() either installs a connection or returns an error
            self.transition(ClientState::Idle);
            return ResponseOutcome::failure(started.elapsed(), "connect", "no connection");
        };
        let result = conn
            .send_and_receive(&framed, self.settings.read_timeout)
            .await;

        match result {
            Ok(response) => {
                self.framing_errors = 0;
                self.transition(ClientState::Ready);
                ResponseOutcome::success(
                    response.elapsed,
                    response.wire_len,
                    ResponseSummary::scan(&response.payload),
                )
            }
            Err(e) => {
                debug!("Client {} {} request failed: {}", self.id, kind, e);
                let outcome = ResponseOutcome::failure(started.elapsed(), e.kind().as_str(), &e);
                self.after_failure(&e);
                outcome
            }
        }
    }

    fn after_failure(&mut self, err: &WireError) {
        let discard = if err.poisons_connection() {
            true
        } else {
            self.framing_errors += 1;
            self.framing_errors >= MAX_CONSECUTIVE_FRAMING_ERRORS
        };
        if !discard {
            self.transition(ClientState::Ready);
            return;
        }

        self.connection = None;
        self.framing_errors = 0;
        match self.settings.reconnect {
            ReconnectPolicy::OnFailure => self.transition(ClientState::Idle),
            ReconnectPolicy::Never => {
                warn!(
                    "Client {} lost its connection ({}), stopping",
                    self.id,
                    err.kind()
                );
                self.transition(ClientState::Stopped);
            }
        }
    }

    async fn reconnect(&mut self) -> Result<(), WireError> {
        if !self.settings.reconnect_backoff.is_zero() {
            tokio::time::sleep(self.settings.reconnect_backoff).await;
        }
        self.transition(ClientState::Connecting);
        match self.connector.connect().await {
            Ok(conn) => {
                warn!("Client {} reconnected to {}", self.id, conn.peer());
                self.connection = Some(conn);
                self.reconnects += 1;
                self.transition(ClientState::Ready);
                Ok(())
            }
            Err(e) => {
                self.transition(ClientState::Idle);
                Err(e)
            }
        }
    }

    /// Run cycles until told to stop, the request limit is reached, or the
    /// connection is lost for good. The stop flag is checked between cycles.
    ///
    /// Call [`start`](Self::start) first. A client that never connected
    /// stops at once with [`StopReason::NotStarted`].
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> ClientSummary {
        let stop_reason = loop {
            if *stop.borrow() {
                break StopReason::Signalled;
            }
            if let Some(max) = self.settings.max_requests {
                if self.cycles >= max {
                    break StopReason::RequestLimit;
                }
            }
            match self.run_cycle().await {
                Err(e) => {
                    warn!("{}", e);
                    break StopReason::NotStarted;
                }
                Ok(_) if self.state == ClientState::Stopped => break StopReason::ConnectionLost,
                Ok(_) => {}
            }

            let think_time = self.settings.think_time;
            if !think_time.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(think_time) => {}
                    _ = stop.changed() => {}
                }
            }
        };

        self.stop().await;
        ClientSummary {
            client: self.id,
            cycles: self.cycles,
            reconnects: self.reconnects,
            stop_reason,
        }
    }

    /// Close the connection and move to `Stopped`.
    pub async fn stop(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.shutdown().await;
        }
        self.transition(ClientState::Stopped);
    }
}
