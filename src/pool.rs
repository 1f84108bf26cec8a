use std::sync::Arc;

use log::{error, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::{topology, BrokerClient, ExchangeKind, LapinBrokerClient, QueueConfig};
use crate::config::Config;
use crate::error::DispatchError;
use crate::gateway::HttpGatewayClient;
use crate::throttler::Throttler;
use crate::worker::{self, WorkerContext};

/// `WORKER_ENABLED` gate, checked before `Pool::new`/`start` are even
/// called: matches the original's module-level `IsEnabled()`.
pub fn is_enabled(config: &Config) -> bool {
    config.worker_enabled
}

/// Supervises `worker_count` independent consumer tasks sharing one
/// `Throttler`. Each worker owns its own broker connection and gateway
/// client so one worker's broker hiccup can't stall another.
pub struct Pool {
    config: Config,
    throttler: Arc<Throttler>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Pool {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            throttler: Arc::new(Throttler::new()),
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Spawns `worker_count` tasks. Each declares its own topology (exchange,
    /// main queue, delay queue) before entering its consume loop, matching
    /// the original's per-worker declaration (idempotent, so redundant across
    /// workers).
    pub async fn start(&mut self) {
        info!(
            "starting {} message worker(s)",
            self.config.worker_count
        );

        for worker_id in 1..=self.config.worker_count {
            let config = self.config.clone();
            let throttler = Arc::clone(&self.throttler);
            let cancel = self.cancel.clone();

            let handle = tokio::spawn(async move {
                run_worker(worker_id, config, throttler, cancel).await;
            });
            self.handles.push(handle);
        }
    }

    /// Cancels every worker's consume loop and waits for all of them to
    /// finish their in-flight delivery before returning.
    pub async fn stop(mut self) {
        info!("shutting down workers");
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("worker task panicked: {}", e);
            }
        }
        info!("all workers stopped");
    }
}

async fn run_worker(worker_id: usize, config: Config, throttler: Arc<Throttler>, cancel: CancellationToken) {
    info!("worker {}: starting", worker_id);

    let result = run_worker_inner(worker_id, &config, throttler, cancel.clone()).await;
    if let Err(e) = result {
        error!("worker {}: initialization failed: {}", worker_id, e);
    }

    info!("worker {}: shutting down", worker_id);
}

async fn run_worker_inner(
    worker_id: usize,
    config: &Config,
    throttler: Arc<Throttler>,
    cancel: CancellationToken,
) -> Result<(), DispatchError> {
    let gateway = Arc::new(HttpGatewayClient::new(&config.matrix_client_url)?);

    let broker = Arc::new(LapinBrokerClient::dial(&config.rabbitmq_url).await?);
    declare_topology(broker.as_ref(), config).await?;

    let ctx = Arc::new(WorkerContext {
        worker_id,
        broker: broker.clone() as Arc<dyn BrokerClient>,
        gateway,
        throttler,
        exchange_name: config.message_exchange_name.clone(),
        delay_queue_name: config.message_delay_queue_name.clone(),
    });

    let queue_name = config.message_queue_name.clone();
    worker::run(ctx, &queue_name, cancel).await?;

    broker.close().await
}

async fn declare_topology(broker: &LapinBrokerClient, config: &Config) -> Result<(), DispatchError> {
    broker
        .declare_exchange(&config.message_exchange_name, ExchangeKind::Topic)
        .await?;

    broker
        .declare_queue(QueueConfig::new(&config.message_queue_name))
        .await?;
    broker
        .bind_queue(
            &config.message_queue_name,
            &config.message_exchange_name,
            topology::BINDING_PATTERN,
        )
        .await?;

    broker
        .declare_queue(topology::delay_queue_config(
            &config.message_delay_queue_name,
            &config.message_exchange_name,
        ))
        .await?;

    broker.set_qos(1, 0, false).await?;
    Ok(())
}
