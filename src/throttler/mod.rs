mod limiter;
mod registry;

pub use limiter::TokenBucket;
pub use registry::{default_platform_configs, PlatformConfig, Throttler, DEFAULT_PLATFORM_KEY};
