pub mod broker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod message;
pub mod pool;
pub mod publish;
pub mod throttler;
pub mod worker;

pub use config::Config;
pub use error::DispatchError;
pub use message::QueuedMessage;
pub use pool::Pool;
pub use publish::Publisher;
