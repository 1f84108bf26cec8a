use crate::broker::{BrokerClient, ExchangeKind, LapinBrokerClient, PublishOptions};
use crate::error::DispatchError;
use crate::message::{routing_key, QueuedMessage};

/// Enqueues `QueuedMessage`s onto the topic exchange. Holds one connection
/// across calls instead of dialing per publish, unlike the original's
/// handler-level `send.go`.
pub struct Publisher {
    broker: LapinBrokerClient,
    exchange_name: String,
}

impl Publisher {
    pub async fn connect(rabbitmq_url: &str, exchange_name: &str) -> Result<Self, DispatchError> {
        let broker = LapinBrokerClient::dial(rabbitmq_url).await?;
        broker
            .declare_exchange(exchange_name, ExchangeKind::Topic)
            .await?;
        Ok(Self {
            broker,
            exchange_name: exchange_name.to_string(),
        })
    }

    /// Publishes `msg` with routing key `message.<platform>.<username>`,
    /// persistent delivery mode, JSON content type.
    pub async fn publish(&self, msg: &QueuedMessage) -> Result<(), DispatchError> {
        msg.validate()?;
        let body = msg.to_json()?;
        let key = routing_key(&msg.platform_name, &msg.username);
        self.broker
            .publish(&self.exchange_name, &key, &body, PublishOptions::default())
            .await
    }

    pub async fn close(&self) -> Result<(), DispatchError> {
        self.broker.close().await
    }
}
