//! AMQP gateway: owns the broker connection, declares topology and runs
//! consume loops with manual acknowledgment.
//!
//! Delivery guarantee is at-least-once. A message is never acknowledged
//! before its handler finishes; a crash mid-handler leaves it unacked and
//! the broker redelivers it, so handlers must tolerate duplicates. The
//! prefetch bound caps in-flight deliveries per consumer, which doubles as
//! backpressure against a slow store or index.
use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const DIAL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
    #[error("broker unreachable after {0:?}")]
    Unreachable(Duration),
}

/// What to do with a delivery once its handler has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Nack with requeue: the broker redelivers later.
    Requeue,
    /// Nack without requeue: gone, unless the broker routes it to a DLQ.
    Discard,
}

/// A message consumer. Returns the delivery's disposition; the gateway
/// performs the matching ack/nack. Implementations must never panic on
/// malformed input — decode failures map to [`Disposition::Discard`].
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, payload: &[u8]) -> Disposition;
}

/// Publishing half of the gateway, split out so consumers that republish
/// events can be tested without a broker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        persistent: bool,
    ) -> Result<(), QueueError>;
}

/// Topology and consumption policy for one queue binding.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    /// Unacknowledged deliveries held concurrently.
    pub prefetch: u16,
    /// Per-message processing deadline.
    pub timeout: Duration,
    /// Disposition applied when the deadline elapses. A timeout is an
    /// unexpected error, so it follows the subscription's error policy.
    pub on_timeout: Disposition,
}

pub struct AmqpGateway {
    url: String,
    publisher: Mutex<Option<(Connection, Channel)>>,
}

impl AmqpGateway {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            publisher: Mutex::new(None),
        }
    }

    /// Eagerly dial the broker so bootstrap fails fast when it is down for
    /// longer than `max_wait`.
    pub async fn connect(&self, max_wait: Duration) -> Result<(), QueueError> {
        let connection = connect_with_retry(&self.url, max_wait).await?;
        let channel = connection.create_channel().await?;
        *self.publisher.lock().await = Some((connection, channel));
        Ok(())
    }

    async fn publisher_channel(&self) -> Result<Channel, QueueError> {
        let mut guard = self.publisher.lock().await;
        if let Some((connection, channel)) = guard.as_ref() {
            if connection.status().connected() && channel.status().connected() {
                return Ok(channel.clone());
            }
            warn!("publisher connection lost, re-dialing broker");
        }
        let connection = connect_with_retry(&self.url, RECONNECT_BACKOFF * 6).await?;
        let channel = connection.create_channel().await?;
        *guard = Some((connection, channel.clone()));
        Ok(channel)
    }

    /// Spawn a supervised consume loop for `subscription`. The loop
    /// re-dials and re-declares topology whenever the connection drops;
    /// unacked in-flight messages are redelivered by the broker.
    pub fn spawn_subscriber(
        &self,
        subscription: Subscription,
        handler: Arc<dyn MessageHandler>,
    ) -> tokio::task::JoinHandle<()> {
        let url = self.url.clone();
        tokio::spawn(async move {
            loop {
                match consume_once(&url, &subscription, &handler).await {
                    Ok(()) => {
                        warn!(queue = %subscription.queue, "consume stream ended, reconnecting")
                    }
                    Err(err) => {
                        error!(queue = %subscription.queue, error = ?err, "consumer failed, reconnecting")
                    }
                }
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        })
    }
}

/// One connection lifetime: declare topology, then dispatch deliveries
/// until the stream ends.
async fn consume_once(
    url: &str,
    subscription: &Subscription,
    handler: &Arc<dyn MessageHandler>,
) -> Result<(), QueueError> {
    let connection = connect_with_retry(url, RECONNECT_BACKOFF * 12).await?;
    let channel = connection.create_channel().await?;
    declare_topology(&channel, subscription).await?;
    channel
        .basic_qos(subscription.prefetch, BasicQosOptions::default())
        .await?;

    let mut consumer = channel
        .basic_consume(
            &subscription.queue,
            "vod-service",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;
    info!(
        queue = %subscription.queue,
        routing_key = %subscription.routing_key,
        prefetch = subscription.prefetch,
        "consuming"
    );

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                let handler = Arc::clone(handler);
                let timeout = subscription.timeout;
                let on_timeout = subscription.on_timeout;
                let queue = subscription.queue.clone();
                // One task per delivery; the prefetch bound caps how
                // many run at once. Ack/nack happens in the task, never
                // before the handler completes.
                tokio::spawn(async move {
                    let disposition =
                        match tokio::time::timeout(timeout, handler.handle(&delivery.data))
                            .await
                        {
                            Ok(disposition) => disposition,
                            Err(_) => {
                                warn!(%queue, ?timeout, "handler deadline elapsed");
                                on_timeout
                            }
                        };
                    let result = match disposition {
                        Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
                        Disposition::Requeue => {
                            delivery
                                .nack(BasicNackOptions {
                                    requeue: true,
                                    multiple: false,
                                })
                                .await
                        }
                        Disposition::Discard => {
                            delivery
                                .nack(BasicNackOptions {
                                    requeue: false,
                                    multiple: false,
                                })
                                .await
                        }
                    };
                    if let Err(err) = result {
                        error!(%queue, error = ?err, "ack/nack failed");
                    }
                });
            }
            Err(err) => error!(queue = %subscription.queue, error = ?err, "delivery error"),
        }
    }

    Ok(())
}

#[async_trait]
impl EventPublisher for AmqpGateway {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        persistent: bool,
    ) -> Result<(), QueueError> {
        let channel = self.publisher_channel().await?;
        let properties = if persistent {
            BasicProperties::default().with_delivery_mode(2)
        } else {
            BasicProperties::default()
        };
        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }
}

async fn declare_topology(
    channel: &Channel,
    subscription: &Subscription,
) -> Result<(), QueueError> {
    channel
        .exchange_declare(
            &subscription.exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_declare(
            &subscription.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            &subscription.queue,
            &subscription.exchange,
            &subscription.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

async fn connect_with_retry(url: &str, max_wait: Duration) -> Result<Connection, QueueError> {
    let mut waited = Duration::ZERO;
    loop {
        match Connection::connect(url, ConnectionProperties::default()).await {
            Ok(connection) => return Ok(connection),
            Err(err) if waited >= max_wait => {
                error!(error = ?err, "broker dial gave up");
                return Err(QueueError::Unreachable(max_wait));
            }
            Err(err) => {
                if waited.as_secs() % 5 == 0 {
                    info!(error = ?err, waited_secs = waited.as_secs(), "broker dial retry");
                }
                tokio::time::sleep(DIAL_INTERVAL).await;
                waited += DIAL_INTERVAL;
            }
        }
    }
}
