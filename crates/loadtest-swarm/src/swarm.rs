//! Running many virtual clients at once.
//!
//! Each client is its own tokio task with its own connection. The only
//! state they share is the metrics recorder. A watch channel tells them to
//! stop; they notice it between request cycles.

use crate::aggregator::{Aggregator, SwarmReport};
use crate::client::{ClientError, ClientSettings, ClientSummary, TcpConnector, VirtualClient};
use crate::config::SwarmConfig;
use crate::metrics::{ChannelRecorder, MetricsRecorder};
use loadtest_generator::generators::ids::{ACCOUNT_DIGITS, ACCOUNT_PREFIX};
use loadtest_generator::{PayloadGenerator, SequentialIds};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// The result of a finished swarm run.
#[derive(Debug, Clone)]
pub struct SwarmOutcome {
    pub report: SwarmReport,
    pub clients: Vec<ClientSummary>,
}

impl SwarmOutcome {
    /// Whether no client managed to connect.
    pub fn all_failed_to_start(&self) -> bool {
        self.report.clients > 0 && self.report.startup_failures == self.report.clients
    }
}

/// Run a swarm until its duration or request limit is reached, or Ctrl-C.
pub async fn run_swarm(config: SwarmConfig) -> anyhow::Result<SwarmOutcome> {
    run_swarm_until(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received, stopping clients");
    })
    .await
}

/// Run a swarm until its duration or request limit is reached, or until
/// `shutdown` completes.
pub async fn run_swarm_until(
    config: SwarmConfig,
    shutdown: impl Future<Output = ()> + Send,
) -> anyhow::Result<SwarmOutcome> {
    config.validate()?;
    info!(
        "Starting {} clients against {}:{} ({})",
        config.clients, config.host, config.port, config.mix
    );

    let (channel, rx) = ChannelRecorder::channel();
    let aggregator = tokio::spawn(Aggregator::new().collect(rx));
    let recorder: Arc<dyn MetricsRecorder> = Arc::new(channel);

    let (stop_tx, stop_rx) = watch::channel(false);
    let connector = TcpConnector::from_config(&config);
    let settings = ClientSettings::from(&config);
    let id_span = SequentialIds::default().capacity() / config.clients as u64;

    let mut tasks: JoinSet<Result<ClientSummary, ClientError>> = JoinSet::new();
    for index in 0..config.clients {
        let ids = SequentialIds::new(ACCOUNT_PREFIX, ACCOUNT_DIGITS)
            .starting_at(index as u64 * id_span);
        let generator = PayloadGenerator::new(config.client_seed(index))
            .with_ids(ids)
            .with_trans_id_mode(config.trans_ids);
        let mut client = VirtualClient::new(
            index,
            connector.clone(),
            generator,
            recorder.clone(),
            settings.clone(),
        );
        let stop = stop_rx.clone();
        tasks.spawn(async move {
            client.start().await?;
            Ok(client.run(stop).await)
        });
    }
    drop(recorder);

    let deadline = async {
        match config.duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    tokio::pin!(shutdown);

    let mut summaries = Vec::with_capacity(config.clients);
    let mut startup_failures = 0;
    let mut stopping = false;
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Ok(Ok(summary))) => summaries.push(summary),
                // The client has already logged why it could not start.
                Some(Ok(Err(_))) => startup_failures += 1,
                Some(Err(e)) => error!("Client task failed: {}", e),
            },
            _ = &mut deadline, if !stopping => {
                info!("Run duration reached, stopping clients");
                stopping = true;
                let _ = stop_tx.send(true);
            }
            _ = &mut shutdown, if !stopping => {
                stopping = true;
                let _ = stop_tx.send(true);
            }
        }
    }

    if startup_failures > 0 {
        error!(
            "{} of {} clients failed to start",
            startup_failures, config.clients
        );
    }

    let aggregator = aggregator.await?;
    let report = aggregator.finish(config.clients, startup_failures);
    info!(
        "Run finished: {} requests, {} failed",
        report.total.requests, report.total.failures
    );

    summaries.sort_by_key(|s| s.client);
    Ok(SwarmOutcome {
        report,
        clients: summaries,
    })
}
