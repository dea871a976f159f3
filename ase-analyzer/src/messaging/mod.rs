//! Message client for the ASE topics
//!
//! Topics map onto routing keys of one topic exchange. A shared subscription is
//! a named queue bound to the inbound topic: every analyzer instance consumes
//! from the same queue, so each delivery reaches exactly one of them.

pub mod subscription;

use async_trait::async_trait;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ase_common::config::BrokerCredentials;
use ase_common::AnalyzedNotification;

use crate::error::{AnalyzerError, Result};

pub use subscription::{drive_deliveries, run_subscription};

/// Publishes analyzed notifications downstream
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Identity of the connected client, used as notification provenance
    fn client_id(&self) -> &str;

    async fn publish(&self, topic: &str, notification: &AnalyzedNotification, ttl: Duration) -> Result<()>;
}

/// Generate a client identity in the broker's `AUTO_xxxxxxx` style
pub fn generate_client_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("AUTO_{}", &id[..7])
}

/// Provenance label placed in the `frontend` field of notifications
pub fn frontend_label(client_id: &str) -> String {
    format!("Rust: {}", client_id)
}

/// Connection properties: named after the client and driven by the tokio runtime
///
/// Must be called from within a tokio runtime.
pub fn connection_properties(client_id: &str) -> ConnectionProperties {
    ConnectionProperties::default()
        .with_connection_name(client_id.to_string().into())
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio)
}

/// Consume with automatic acknowledgement
pub fn consume_options() -> BasicConsumeOptions {
    BasicConsumeOptions {
        no_ack: true,
        ..BasicConsumeOptions::default()
    }
}

/// Map a publisher confirm onto the publish result
///
/// The channel runs in confirm mode, so anything other than an ack means the
/// broker did not take the notification.
pub fn check_confirmation(confirmation: Confirmation, topic: &str) -> Result<()> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => Err(AnalyzerError::Publish(format!("broker rejected notification on {}", topic))),
        Confirmation::NotRequested => Err(AnalyzerError::Publish(format!(
            "no publisher confirm for notification on {}",
            topic
        ))),
    }
}

/// AMQP connection with one channel used for both consuming and publishing
pub struct AmqpClient {
    connection: Connection,
    channel: Channel,
    client_id: String,
    exchange: String,
}

impl AmqpClient {
    /// Connect to the broker and open the working channel in confirm mode
    pub async fn connect(broker: &BrokerCredentials, exchange: &str) -> Result<Self> {
        let client_id = generate_client_id();

        let connection = Connection::connect(&broker.connection_uri(), connection_properties(&client_id)).await?;
        let channel = connection.create_channel().await?;
        channel.confirm_select(ConfirmSelectOptions::default()).await?;
        info!("Connected to {} using client-id {}", broker.service, client_id);

        Ok(Self {
            connection,
            channel,
            client_id,
            exchange: exchange.to_string(),
        })
    }

    /// Join the shared subscription `share_id` on `topic`
    ///
    /// Deliveries are acknowledged automatically. `credit` is sent as the
    /// channel prefetch, but brokers only apply prefetch to unacknowledged
    /// deliveries, so it does not bound in-flight work here.
    pub async fn subscribe(&self, topic: &str, share_id: &str, credit: u16) -> Result<Consumer> {
        self.channel.basic_qos(credit, BasicQosOptions::default()).await?;

        let queue = self
            .channel
            .queue_declare(share_id, QueueDeclareOptions::default(), FieldTable::default())
            .await?;

        self.channel
            .queue_bind(
                queue.name().as_str(),
                &self.exchange,
                topic,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let consumer = self
            .channel
            .basic_consume(
                queue.name().as_str(),
                &self.client_id,
                consume_options(),
                FieldTable::default(),
            )
            .await?;

        info!("Subscribed to {} (share '{}', credit {})", topic, share_id, credit);
        Ok(consumer)
    }

    pub async fn close(&self) {
        if let Err(e) = self.connection.close(200, "analyzer shutting down").await {
            warn!("Error closing broker connection: {}", e);
        }
    }
}

#[async_trait]
impl NotificationPublisher for AmqpClient {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn publish(&self, topic: &str, notification: &AnalyzedNotification, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_vec(notification)?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_expiration(ttl.as_millis().to_string().into());

        let confirmation = self
            .channel
            .basic_publish(&self.exchange, topic, BasicPublishOptions::default(), &payload, properties)
            .await?
            .await?;
        check_confirmation(confirmation, topic)?;

        debug!("Published notification on {}", topic);
        Ok(())
    }
}
