use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::modules::resize::dispatcher::{DispatchHandle, JobDispatcher, RenditionState};
use crate::modules::resize::events::ResizeJob;
use crate::state::AppState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use lapin::message::Delivery;
use lapin::options::BasicAckOptions;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

const CONSUMER_TAG: &str = "image_resizer";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A consumed message that is settled once its work is done.
#[async_trait]
pub trait InboundMessage: Send + 'static {
    fn body(&self) -> &[u8];

    async fn settle(self) -> Result<(), String>;
}

#[async_trait]
impl InboundMessage for Delivery {
    fn body(&self) -> &[u8] {
        &self.data
    }

    async fn settle(self) -> Result<(), String> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Decodes one delivery body and fans it out.
pub async fn process_payload(dispatcher: &JobDispatcher, payload: &[u8]) -> DispatchHandle {
    let job = ResizeJob::decode(payload);
    dispatcher.dispatch(job).await
}

/// Acks once every rendition of the delivery has reached a terminal state.
async fn ack_when_done<M: InboundMessage>(message: M, handle: DispatchHandle) {
    let job_id = handle.job_id;
    let outcomes = handle.join().await;
    let keys: Vec<&str> = outcomes.iter().filter_map(|o| o.key.as_deref()).collect();
    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| o.state != RenditionState::Uploaded)
        .map(|o| o.size.as_str())
        .collect();

    if failed.is_empty() {
        info!(%job_id, ?keys, "✅ Job completed");
    } else {
        warn!(%job_id, ?keys, ?failed, "Job completed with failures");
    }

    if let Err(e) = message.settle().await {
        error!(%job_id, error = %e, "Failed to ack message");
    }
}

/// Consumes until the stream ends or `shutdown` resolves, then waits up to
/// `drain_timeout` for outstanding acks.
pub async fn consume<S, M, E, F>(
    dispatcher: &JobDispatcher,
    mut messages: S,
    shutdown: F,
    drain_timeout: Duration,
) where
    S: Stream<Item = Result<M, E>> + Unpin,
    M: InboundMessage,
    E: Display,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut in_flight = JoinSet::new();

    loop {
        let next = tokio::select! {
            next = messages.next() => next,
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                error!(error = %e, "Consumer error");
                continue;
            }
            None => {
                warn!("Consumer stream ended");
                break;
            }
        };

        // dispatch blocks while the worker is saturated; stay responsive to shutdown
        let handle = tokio::select! {
            handle = process_payload(dispatcher, message.body()) => handle,
            _ = &mut shutdown => {
                info!("Shutdown signal received while dispatching; message left unacked");
                break;
            }
        };
        if handle.task_count() == 0 {
            info!(job_id = %handle.job_id, "Nothing to render; acking");
        }
        in_flight.spawn(ack_when_done(message, handle));

        while let Some(done) = in_flight.try_join_next() {
            if let Err(e) = done {
                error!(error = %e, "Ack task failed");
            }
        }
    }

    if !in_flight.is_empty() {
        info!(pending = in_flight.len(), "Waiting for in-flight jobs");
    }
    let drained = tokio::time::timeout(drain_timeout, async {
        while in_flight.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            abandoned = in_flight.len(),
            "In-flight jobs did not finish in time; they will be redelivered"
        );
        in_flight.shutdown().await;
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

pub async fn start_resize_worker(state: AppState) -> Result<()> {
    info!("🖼️ Starting resize worker...");

    let queue_config = &state.config.queue;
    let uri = queue_config.uri().context("Invalid AMQP settings")?;
    let queue = RabbitMqService::new(&uri)
        .await
        .context("Failed connect to RabbitMQ")?;

    queue
        .declare_queue(&queue_config.queue_name)
        .await
        .context("Failed queue declare")?;

    let prefetch = u16::try_from(state.config.worker_concurrency).unwrap_or(u16::MAX);
    let consumer = queue
        .consume(&queue_config.queue_name, CONSUMER_TAG, prefetch)
        .await
        .context("Failed consume to queue")?;

    info!(queue = %queue_config.queue_name, prefetch, "🖼️ Resize worker listening");

    consume(&state.dispatcher, consumer, ctrl_c(), DRAIN_TIMEOUT).await;

    queue.close().await;
    Ok(())
}
