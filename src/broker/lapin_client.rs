use async_trait::async_trait;
use futures_util::stream::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::Mutex;

use super::client::{AckHandle, BrokerClient, Delivery, DeliveryStream, PublishOptions, QueueConfig};
use super::ExchangeKind;
use crate::error::DispatchError;

/// Connection + channel wrapper around `lapin`. On `dial`, if channel
/// creation fails the connection is closed before returning, same as the
/// original's `dial()`.
pub struct LapinBrokerClient {
    connection: Connection,
    channel: Channel,
}

impl LapinBrokerClient {
    pub async fn dial(url: &str) -> Result<Self, DispatchError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| DispatchError::ConnectFailed(e.to_string()))?;

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(0, "channel open failed").await;
                return Err(DispatchError::ChannelFailed(e.to_string()));
            }
        };

        Ok(Self { connection, channel })
    }
}

fn to_lapin_exchange_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
    }
}

fn queue_args(args: &[(String, String)]) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in args {
        table.insert(
            key.as_str().into(),
            AMQPValue::LongString(LongString::from(value.as_str())),
        );
    }
    table
}

#[async_trait]
impl BrokerClient for LapinBrokerClient {
    async fn declare_queue(&self, config: QueueConfig) -> Result<(), DispatchError> {
        self.channel
            .queue_declare(
                &config.name,
                QueueDeclareOptions {
                    durable: config.durable,
                    auto_delete: config.auto_delete,
                    exclusive: config.exclusive,
                    ..QueueDeclareOptions::default()
                },
                queue_args(&config.args),
            )
            .await
            .map_err(|source| DispatchError::QueueDeclare {
                name: config.name.clone(),
                source,
            })?;
        Ok(())
    }

    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), DispatchError> {
        self.channel
            .exchange_declare(
                name,
                to_lapin_exchange_kind(kind),
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| DispatchError::ExchangeDeclare {
                name: name.to_string(),
                source,
            })
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), DispatchError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| DispatchError::QueueBind {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                source,
            })
    }

    async fn set_qos(
        &self,
        prefetch_count: u16,
        prefetch_size: u32,
        global: bool,
    ) -> Result<(), DispatchError> {
        if prefetch_size != 0 {
            log::warn!(
                "prefetch_size={} requested but lapin's basic.qos only negotiates \
                 prefetch_count; RabbitMQ itself never honors the AMQP prefetch-size field",
                prefetch_size
            );
        }
        self.channel
            .basic_qos(prefetch_count, BasicQosOptions { global })
            .await
            .map_err(DispatchError::Qos)
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream, DispatchError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                queue,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| DispatchError::Consume {
                queue: queue.to_string(),
                source,
            })?;

        let stream = consumer.map(|delivery| match delivery {
            Ok(delivery) => {
                let headers = delivery
                    .properties
                    .headers()
                    .as_ref()
                    .map(|table| {
                        table
                            .inner()
                            .iter()
                            .map(|(k, v)| (k.to_string(), format!("{:?}", v)))
                            .collect()
                    })
                    .unwrap_or_default();
                let acker = LapinAckHandle::new(delivery.acker.clone());
                Ok(Delivery::new(
                    delivery.data.clone(),
                    delivery.routing_key.to_string(),
                    delivery.exchange.to_string(),
                    delivery.delivery_tag,
                    delivery.redelivered,
                    headers,
                    Box::new(acker),
                ))
            }
            Err(e) => Err(DispatchError::Consume {
                queue: String::new(),
                source: e,
            }),
        });

        Ok(Box::pin(stream))
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        opts: PublishOptions,
    ) -> Result<(), DispatchError> {
        let mut props = BasicProperties::default()
            .with_content_type(ShortString::from(opts.content_type.as_str()))
            .with_delivery_mode(opts.delivery_mode)
            .with_priority(opts.priority);
        if let Some(expiration) = &opts.expiration {
            props = props.with_expiration(ShortString::from(expiration.as_str()));
        }

        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: opts.mandatory,
                    immediate: opts.immediate,
                },
                body,
                props,
            )
            .await
            .map_err(|source| DispatchError::Publish {
                exchange: exchange.to_string(),
                source,
            })?
            .await
            .map_err(|source| DispatchError::Publish {
                exchange: exchange.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DispatchError> {
        let channel_err = self.channel.close(0, "closing").await.err();
        let conn_err = self.connection.close(0, "closing").await.err();
        if let Some(e) = channel_err {
            return Err(DispatchError::ChannelFailed(e.to_string()));
        }
        if let Some(e) = conn_err {
            return Err(DispatchError::ConnectFailed(e.to_string()));
        }
        Ok(())
    }
}

/// Idempotent ack/nack: the inner `Acker` is taken on first use, so a
/// second call is a no-op rather than a double-ack error.
struct LapinAckHandle {
    acker: Mutex<Option<lapin::acker::Acker>>,
}

impl LapinAckHandle {
    fn new(acker: lapin::acker::Acker) -> Self {
        Self {
            acker: Mutex::new(Some(acker)),
        }
    }
}

#[async_trait]
impl AckHandle for LapinAckHandle {
    async fn ack(&self) -> Result<(), DispatchError> {
        let mut guard = self.acker.lock().await;
        if let Some(acker) = guard.take() {
            acker
                .ack(BasicAckOptions::default())
                .await
                .map_err(DispatchError::Acknowledge)?;
        }
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), DispatchError> {
        let mut guard = self.acker.lock().await;
        if let Some(acker) = guard.take() {
            acker
                .nack(BasicNackOptions {
                    requeue,
                    ..BasicNackOptions::default()
                })
                .await
                .map_err(DispatchError::Acknowledge)?;
        }
        Ok(())
    }
}
