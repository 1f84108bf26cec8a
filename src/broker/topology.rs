//! Declared broker topology: one topic exchange, one main queue bound to it
//! with a wildcard pattern, and one delay queue that dead-letters back into
//! the exchange on TTL expiry.

/// Both routing-key segments must be dot-free; `BINDING_PATTERN` matches
/// any single-segment platform/username pair.
pub const BINDING_PATTERN: &str = "message.*.*";

/// A deferred message is delivered into the delay queue through the default
/// exchange with routing key equal to the queue name (the only mechanism
/// AMQP offers for delivering directly into an unbound queue) — so the
/// routing key the broker would "fall back to" on dead-letter is that queue
/// name, not the message's original `message.<platform>.<username>` key,
/// and a wildcard DLRK is a literal string that matches nothing. Omitting
/// the DLRK, or setting it to the wildcard pattern verbatim, both fail to
/// re-enter the topic binding.
///
/// Since the worker decodes `platform_name`/`username` from the message
/// body rather than the routing key, re-entry doesn't need the *original*
/// key — only a key that satisfies the topic binding. We set a fixed,
/// literal three-segment routing key here and the main queue's binding
/// pattern (`message.*.*`) matches it like any other.
pub const DELAY_REQUEUE_ROUTING_KEY: &str = "message.requeued.requeued";

pub fn delay_queue_config(
    delay_queue_name: &str,
    exchange_name: &str,
) -> crate::broker::QueueConfig {
    crate::broker::QueueConfig::new(delay_queue_name)
        .with_dead_letter(exchange_name, DELAY_REQUEUE_ROUTING_KEY)
}
