use std::sync::Arc;

use futures_util::StreamExt;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerClient, Delivery, PublishOptions};
use crate::error::DispatchError;
use crate::gateway::{GatewayClient, SendMessageRequest};
use crate::message::QueuedMessage;
use crate::throttler::Throttler;

/// Everything a single delivery handler needs, shared read-only across all
/// workers in the pool.
pub struct WorkerContext {
    pub worker_id: usize,
    pub broker: Arc<dyn BrokerClient>,
    pub gateway: Arc<dyn GatewayClient>,
    pub throttler: Arc<Throttler>,
    pub exchange_name: String,
    pub delay_queue_name: String,
}

/// Consumes from `queue` until the stream ends or `cancel` fires, handling
/// each delivery with panic isolation so one bad message can't take the
/// worker down.
///
/// `cancel` is only raced against waiting for the *next* delivery. Once a
/// delivery has been pulled off the stream, `handle_delivery` always runs to
/// completion outside the select, so a worker never abandons a message
/// that's mid-flight (gateway call, delay-queue publish, ack/nack) when the
/// pool is stopped.
pub async fn run(
    ctx: Arc<WorkerContext>,
    queue: &str,
    cancel: CancellationToken,
) -> Result<(), DispatchError> {
    info!("worker {}: listening on queue '{}'", ctx.worker_id, queue);

    let mut stream = ctx.broker.consume(queue).await?;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("worker {}: cancellation requested", ctx.worker_id);
                break;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(delivery)) => handle_delivery(Arc::clone(&ctx), delivery).await,
            Some(Err(e)) => {
                error!("worker {}: delivery stream error: {}", ctx.worker_id, e);
            }
            None => break,
        }
    }

    info!("worker {}: consumer stream ended", ctx.worker_id);
    Ok(())
}

/// One delivery through decode -> throttle check -> defer-or-send -> ack/nack.
///
/// Runs on its own task so a panic inside message handling is caught as a
/// `JoinError` instead of taking the whole worker loop down with it; the
/// panicked delivery is then nacked without requeue, since whatever made it
/// panic is presumed to make it unprocessable again on redelivery.
async fn handle_delivery(ctx: Arc<WorkerContext>, delivery: Delivery) {
    let worker_id = ctx.worker_id;
    let delivery = Arc::new(delivery);
    let task_delivery = Arc::clone(&delivery);

    let handle = tokio::spawn(async move { handle_delivery_inner(&ctx, &task_delivery).await });

    if let Err(join_err) = handle.await {
        error!("worker {}: message handler panic: {}", worker_id, join_err);
        if let Err(e) = delivery.nack(false).await {
            error!("worker {}: nack after panic failed: {}", worker_id, e);
        }
    }
}

async fn handle_delivery_inner(ctx: &Arc<WorkerContext>, delivery: &Delivery) {
    let msg = match QueuedMessage::from_json(&delivery.body) {
        Ok(msg) => msg,
        Err(e) => {
            error!("worker {}: message decode failed: {}", ctx.worker_id, e);
            ack_or_log(ctx, delivery, false).await;
            return;
        }
    };

    if let Err(e) = msg.validate() {
        error!("worker {}: message validation failed: {}", ctx.worker_id, e);
        ack_or_log(ctx, delivery, false).await;
        return;
    }

    if !ctx.throttler.allow(&msg.platform_name, &msg.username) {
        defer_message(ctx, delivery, &msg).await;
        return;
    }

    send_message(ctx, delivery, &msg).await;
}

async fn defer_message(ctx: &Arc<WorkerContext>, delivery: &Delivery, msg: &QueuedMessage) {
    let wait_time = ctx.throttler.wait_time(&msg.platform_name, &msg.username);
    info!(
        "worker {}: rate limit applied for platform={} username={}, delaying {:?}",
        ctx.worker_id, msg.platform_name, msg.username, wait_time
    );

    let body = match msg.to_json() {
        Ok(body) => body,
        Err(e) => {
            error!("worker {}: re-encode for delay failed: {}", ctx.worker_id, e);
            ack_or_log(ctx, delivery, false).await;
            return;
        }
    };

    let opts = PublishOptions::default().with_expiration(wait_time.as_millis() as u64);
    let publish = ctx
        .broker
        .publish("", &ctx.delay_queue_name, &body, opts)
        .await;

    match publish {
        Ok(()) => ack_or_log(ctx, delivery, true).await,
        Err(e) => {
            error!(
                "worker {}: delay queue publish failed: {}",
                ctx.worker_id, e
            );
            // Requeue: the original message is still valid, only the delay
            // publish failed.
            if let Err(e) = delivery.nack(true).await {
                error!("worker {}: nack after delay-publish failure failed: {}", ctx.worker_id, e);
            }
        }
    }
}

async fn send_message(ctx: &Arc<WorkerContext>, delivery: &Delivery, msg: &QueuedMessage) {
    let request = SendMessageRequest {
        contact: msg.contact.clone(),
        platform_name: msg.platform_name.clone(),
        text: msg.text.clone(),
        username: msg.username.clone(),
    };

    match ctx.gateway.send_message(&msg.device_id, request).await {
        Ok(_) => {
            info!(
                "worker {}: message delivered for device_id={}",
                ctx.worker_id, msg.device_id
            );
            ack_or_log(ctx, delivery, true).await;
        }
        Err(e) => {
            error!("worker {}: message delivery failed: {}", ctx.worker_id, e);
            // Requeue on gateway failure: the failure is presumed transient,
            // unlike a decode/validation failure.
            if let Err(e) = delivery.nack(true).await {
                error!("worker {}: nack after gateway failure failed: {}", ctx.worker_id, e);
            }
        }
    }
}

async fn ack_or_log(ctx: &Arc<WorkerContext>, delivery: &Delivery, ack: bool) {
    let result = if ack {
        delivery.ack().await
    } else {
        delivery.nack(false).await
    };
    if let Err(e) = result {
        error!(
            "worker {}: {} failed: {}",
            ctx.worker_id,
            if ack { "ack" } else { "nack" },
            e
        );
    }
}
