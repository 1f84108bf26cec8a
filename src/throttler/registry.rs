use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::limiter::TokenBucket;

/// Static per-platform rate configuration.
#[derive(Debug, Clone, Copy)]
pub struct PlatformConfig {
    pub rate: u32,
    pub interval: Duration,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

pub const DEFAULT_PLATFORM_KEY: &str = "default";

/// Fallback used when a platform has no entry of its own:
/// `{rate: 1, interval: 8s, jitter: [0.75, 1.25]}`.
pub fn default_platform_configs() -> HashMap<String, PlatformConfig> {
    let mut configs = HashMap::new();
    configs.insert(
        DEFAULT_PLATFORM_KEY.to_string(),
        PlatformConfig {
            rate: 1,
            interval: Duration::from_secs(8),
            jitter_min: 0.75,
            jitter_max: 1.25,
        },
    );
    configs
}

/// Lazily-populated registry of token buckets keyed by `"{platform}:{username}"`.
///
/// `DashMap::entry(..).or_insert_with(..)` gives the same "exactly one bucket
/// instance per key, losers discard their work" semantics as the original's
/// `sync.Map.LoadOrStore` CAS loop, without a manual retry.
pub struct Throttler {
    limiters: DashMap<String, Arc<TokenBucket>>,
    configs: HashMap<String, PlatformConfig>,
}

impl Throttler {
    pub fn new() -> Self {
        Self::with_configs(default_platform_configs())
    }

    pub fn with_configs(configs: HashMap<String, PlatformConfig>) -> Self {
        Self {
            limiters: DashMap::new(),
            configs,
        }
    }

    fn get_or_create(&self, platform: &str, username: &str) -> Arc<TokenBucket> {
        let key = format!("{}:{}", platform, username);
        if let Some(limiter) = self.limiters.get(&key) {
            return Arc::clone(&limiter);
        }
        let config = self
            .configs
            .get(platform)
            .or_else(|| self.configs.get(DEFAULT_PLATFORM_KEY))
            .expect("a 'default' platform config must always be present");
        let fresh = Arc::new(TokenBucket::new(config));
        Arc::clone(self.limiters.entry(key).or_insert(fresh).value())
    }

    pub fn allow(&self, platform: &str, username: &str) -> bool {
        self.get_or_create(platform, username).allow()
    }

    pub fn wait_time(&self, platform: &str, username: &str) -> Duration {
        self.get_or_create(platform, username).wait_time()
    }
}

impl Default for Throttler {
    fn default() -> Self {
        Self::new()
    }
}
