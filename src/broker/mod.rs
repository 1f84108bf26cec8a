mod client;
mod lapin_client;
pub mod topology;

pub use client::{
    AckHandle, BrokerClient, Delivery, DeliveryStream, ExchangeKind, PublishOptions, QueueConfig,
};
pub use lapin_client::LapinBrokerClient;
