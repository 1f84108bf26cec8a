use thiserror::Error;

/// Unified error taxonomy for the dispatch subsystem.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to connect to broker: {0}")]
    ConnectFailed(String),

    #[error("failed to open channel: {0}")]
    ChannelFailed(String),

    #[error("failed to declare exchange '{name}': {source}")]
    ExchangeDeclare {
        name: String,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to declare queue '{name}': {source}")]
    QueueDeclare {
        name: String,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to bind queue '{queue}' to exchange '{exchange}': {source}")]
    QueueBind {
        queue: String,
        exchange: String,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to set QoS: {0}")]
    Qos(#[source] lapin::Error),

    #[error("failed to start consuming from queue '{queue}': {source}")]
    Consume {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to publish to exchange '{exchange}': {source}")]
    Publish {
        exchange: String,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to ack/nack delivery: {0}")]
    Acknowledge(#[source] lapin::Error),

    #[error("invalid message payload: {0}")]
    InvalidMessage(String),

    #[error("message decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("message encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("gateway request failed: {0}")]
    Gateway(String),

    #[error("gateway returned non-success status {status}: {body}")]
    GatewayStatus { status: u16, body: String },
}
