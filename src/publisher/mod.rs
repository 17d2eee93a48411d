//! Publishing to the incidents message bus
//!
//! The bus itself is an external collaborator; the core only needs a
//! narrow publish interface. The AMQP implementation owns one long-lived
//! connection acquired at startup; reconnect-on-failure is deliberately
//! out of scope, so a publish failure is a total transport failure for
//! that cycle.

use crate::error::PublishError;
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use log::{debug, info};

/// Topic exchange all observer output goes to
pub const INCIDENTS_EXCHANGE: &str = "incidents";

/// Routing key for the per-cycle health summary
pub const HEALTH_SUMMARY_ROUTING_KEY: &str = "cluster.health.summary";

/// Narrow publish interface to the message bus
///
/// Tests substitute an in-memory mock; production uses [`AmqpPublisher`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one JSON message to the incidents exchange
    async fn publish(&self, routing_key: &str, body: &[u8]) -> Result<(), PublishError>;
}

/// Publisher backed by a RabbitMQ topic exchange
pub struct AmqpPublisher {
    connection: Connection,
    channel: Channel,
}

impl AmqpPublisher {
    /// Connect to the broker and declare the incidents exchange
    ///
    /// Called once at startup; a failure here is fatal, the agent does not
    /// run without a bus to publish to.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Amqp` if the connection, channel or exchange
    /// declaration fails.
    pub async fn connect(url: &str) -> Result<Self, PublishError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                INCIDENTS_EXCHANGE,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!("Connected to message bus, exchange '{}' declared", INCIDENTS_EXCHANGE);
        Ok(Self { connection, channel })
    }

    /// Close the channel and connection
    pub async fn close(&self) {
        if let Err(e) = self.connection.close(200, "shutdown").await {
            debug!("Error closing bus connection: {}", e);
        }
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(&self, routing_key: &str, body: &[u8]) -> Result<(), PublishError> {
        self.channel
            .basic_publish(
                INCIDENTS_EXCHANGE,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?
            .await?;

        debug!(
            "Published {} bytes to {} with routing key {}",
            body.len(),
            INCIDENTS_EXCHANGE,
            routing_key
        );
        Ok(())
    }
}
