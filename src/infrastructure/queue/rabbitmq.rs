use anyhow::{Result, anyhow};
use lapin::{
    Channel, Connection, ConnectionProperties, Consumer, options::*, types::FieldTable,
};
use tracing::{info, warn};

/// One connection and one channel, held for the lifetime of the worker.
pub struct RabbitMqService {
    conn: Connection,
    channel: Channel,
}

impl RabbitMqService {
    async fn connect(url: &str) -> Result<(Connection, Channel)> {
        info!("Connecting to RabbitMQ");
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))?;

        info!("✅ Connected to RabbitMQ");
        Ok((conn, channel))
    }

    pub async fn new(url: &str) -> Result<Self> {
        let (conn, channel) = Self::connect(url).await?;
        Ok(Self { conn, channel })
    }

    /// Durable, non-exclusive, non-auto-delete.
    pub async fn declare_queue(&self, queue: &str) -> Result<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue, e))?;
        Ok(())
    }

    /// Starts a manually acknowledged consumer with at most `prefetch` unacked deliveries.
    pub async fn consume(&self, queue: &str, consumer_tag: &str, prefetch: u16) -> Result<Consumer> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set prefetch: {}", e))?;

        self.channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer on {}: {}", queue, e))
    }

    pub async fn close(self) {
        if let Err(e) = self.channel.close(200, "worker shutdown").await {
            warn!("Failed to close RabbitMQ channel: {}", e);
        }
        if let Err(e) = self.conn.close(200, "worker shutdown").await {
            warn!("Failed to close RabbitMQ connection: {}", e);
        }
        info!("RabbitMQ connection closed");
    }
}
