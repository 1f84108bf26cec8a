use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::DispatchError;

/// Exchange kind, mirroring the subset of AMQP exchange types this system uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Topic,
    Direct,
    Fanout,
}

/// Declaration parameters for a queue. Default: durable, no auto-delete,
/// non-exclusive.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
    /// `x-dead-letter-exchange` / `x-dead-letter-routing-key` for the delay queue.
    pub args: Vec<(String, String)>,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            auto_delete: false,
            exclusive: false,
            args: Vec::new(),
        }
    }

    /// Dead-letters to `exchange` on TTL expiry, re-published with the fixed
    /// literal `routing_key` (see `topology::delay_queue_config` for why a
    /// wildcard pattern here would black-hole every requeued message).
    pub fn with_dead_letter(mut self, exchange: &str, routing_key: &str) -> Self {
        self.args
            .push(("x-dead-letter-exchange".to_string(), exchange.to_string()));
        self.args
            .push(("x-dead-letter-routing-key".to_string(), routing_key.to_string()));
        self
    }
}

/// Publish options. `expiration` is milliseconds as a decimal string — this
/// is what turns the delay queue into a per-message timer.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub content_type: String,
    /// 1 = transient, 2 = persistent.
    pub delivery_mode: u8,
    pub expiration: Option<String>,
    pub priority: u8,
    pub mandatory: bool,
    pub immediate: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            content_type: "application/json".to_string(),
            delivery_mode: 2,
            expiration: None,
            priority: 0,
            mandatory: false,
            immediate: false,
        }
    }
}

impl PublishOptions {
    pub fn with_expiration(mut self, millis: u64) -> Self {
        self.expiration = Some(millis.to_string());
        self
    }
}

/// One-shot, idempotent acknowledgement handle for a single delivery. A
/// second call to either method is a no-op.
#[async_trait]
pub trait AckHandle: Send + Sync {
    async fn ack(&self) -> Result<(), DispatchError>;
    async fn nack(&self, requeue: bool) -> Result<(), DispatchError>;
}

/// A single delivery pulled off a queue, paired with its acknowledgement handle.
pub struct Delivery {
    pub body: Vec<u8>,
    pub routing_key: String,
    pub exchange: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub headers: Vec<(String, String)>,
    acker: Box<dyn AckHandle>,
}

impl Delivery {
    pub fn new(
        body: Vec<u8>,
        routing_key: String,
        exchange: String,
        delivery_tag: u64,
        redelivered: bool,
        headers: Vec<(String, String)>,
        acker: Box<dyn AckHandle>,
    ) -> Self {
        Self {
            body,
            routing_key,
            exchange,
            delivery_tag,
            redelivered,
            headers,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<(), DispatchError> {
        self.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> Result<(), DispatchError> {
        self.acker.nack(requeue).await
    }
}

pub type DeliveryStream = BoxStream<'static, Result<Delivery, DispatchError>>;

/// Connection + channel wrapper: declare, bind, consume, publish, QoS,
/// close. One implementation (`LapinBrokerClient`) talks to a real broker;
/// tests inject fakes through this trait instead.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn declare_queue(&self, config: QueueConfig) -> Result<(), DispatchError>;

    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), DispatchError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), DispatchError>;

    /// Prefetch 1 for manual-ack consumers, 10 for auto-ack. `prefetch_size`
    /// is the AMQP byte-size bound; most brokers and clients leave it at 0
    /// (unbounded) and throttle on count alone.
    async fn set_qos(
        &self,
        prefetch_count: u16,
        prefetch_size: u32,
        global: bool,
    ) -> Result<(), DispatchError>;

    /// Consumer tag equals the queue name — a stable identifier used to
    /// correlate close notifications.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream, DispatchError>;

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        opts: PublishOptions,
    ) -> Result<(), DispatchError>;

    async fn close(&self) -> Result<(), DispatchError>;
}
