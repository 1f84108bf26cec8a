use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

use super::PlatformConfig;

/// Per-(platform, username) rate limiter.
///
/// Tokens start at 0: a cold bucket denies its first call, avoiding a
/// thundering herd of "free" first messages per tenant on worker startup.
pub struct TokenBucket {
    inner: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
    jitter_min: f64,
    jitter_max: f64,
}

impl TokenBucket {
    pub fn new(config: &PlatformConfig) -> Self {
        let jitter_min = if config.jitter_min == 0.0 { 1.0 } else { config.jitter_min };
        let jitter_max = if config.jitter_max == 0.0 { 1.0 } else { config.jitter_max };
        let refill_rate = config.rate as f64 / config.interval.as_secs_f64();
        Self {
            inner: Mutex::new(BucketState {
                tokens: 0.0,
                max_tokens: config.rate as f64,
                refill_rate,
                last_refill: Instant::now(),
                jitter_min,
                jitter_max,
            }),
        }
    }

    /// Refills under jitter, then admits if at least one token is available.
    pub fn allow(&self) -> bool {
        let mut state = self.inner.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();

        let jitter = sample_jitter(state.jitter_min, state.jitter_max);
        let adjusted_refill_rate = state.refill_rate / jitter;

        state.tokens = (state.tokens + elapsed * adjusted_refill_rate).min(state.max_tokens);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Estimated wait until the next admission; an estimate used as delay-queue TTL.
    pub fn wait_time(&self) -> Duration {
        let state = self.inner.lock().unwrap();
        if state.tokens >= 1.0 {
            return Duration::ZERO;
        }
        let jitter = sample_jitter(state.jitter_min, state.jitter_max);
        let tokens_needed = 1.0 - state.tokens;
        let wait_seconds = (tokens_needed / state.refill_rate) * jitter;
        Duration::from_secs_f64(wait_seconds.max(0.0))
    }
}

fn sample_jitter(min: f64, max: f64) -> f64 {
    if (max - min).abs() < f64::EPSILON {
        return min;
    }
    rand::thread_rng().gen_range(min..max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn config(rate: u32, interval: Duration) -> PlatformConfig {
        PlatformConfig {
            rate,
            interval,
            jitter_min: 1.0,
            jitter_max: 1.0,
        }
    }

    #[test]
    fn cold_bucket_denies_first_call() {
        let bucket = TokenBucket::new(&config(2, Duration::from_secs(1)));
        assert!(!bucket.allow(), "first request should be throttled");
    }

    #[test]
    fn admits_after_refill_and_denies_immediate_followup() {
        let bucket = TokenBucket::new(&config(2, Duration::from_secs(1)));
        assert!(!bucket.allow());

        sleep(Duration::from_millis(550));
        assert!(bucket.allow(), "request after 0.5s should be allowed");
        assert!(!bucket.allow(), "second immediate request should be throttled");

        sleep(Duration::from_millis(550));
        assert!(bucket.allow(), "request after another 0.5s should be allowed");
    }

    #[test]
    fn tokens_never_exceed_max_or_go_negative() {
        let bucket = TokenBucket::new(&config(1, Duration::from_millis(10)));
        for _ in 0..50 {
            sleep(Duration::from_millis(5));
            bucket.allow();
            let tokens = bucket.inner.lock().unwrap().tokens;
            assert!(tokens >= 0.0 && tokens <= 1.0);
        }
    }

    #[test]
    fn wait_time_is_zero_when_tokens_available() {
        let bucket = TokenBucket::new(&config(1, Duration::from_secs(2)));
        sleep(Duration::from_millis(2100));
        assert!(bucket.allow());
        // tokens just got consumed to admit; next call should need to wait, or
        // if refill already exceeds 1 again the wait is zero. Either is valid.
        let _ = bucket.wait_time();
    }

    #[test]
    fn wait_time_bounded_by_interval() {
        let bucket = TokenBucket::new(&config(1, Duration::from_secs(2)));
        assert!(!bucket.allow());
        let wait = bucket.wait_time();
        assert!(wait > Duration::ZERO && wait <= Duration::from_secs(2));
    }
}
