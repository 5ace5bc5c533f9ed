//! RabbitMQ transport for the queue publisher (AMQP 0-9-1 via `lapin`).

use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    publisher_confirm::Confirmation,
    types::FieldTable,
    uri::{AMQPAuthority, AMQPUri, AMQPUserInfo},
};
use tracing::debug;

use super::publisher::{Broker, BrokerError};
use crate::config::QueueConfig;

/// Persistent messages survive a broker restart once routed to a durable queue.
const PERSISTENT: u8 = 2;
/// AMQP `reply-success`, sent when we close a connection ourselves.
const REPLY_SUCCESS: u16 = 200;

pub struct AmqpBroker {
    uri: AMQPUri,
    queue: String,
    exchange: String,
}

/// An open connection with a confirm-mode channel on which the queue has
/// been declared.
pub struct AmqpChannel {
    connection: Connection,
    channel: Channel,
}

impl AmqpBroker {
    pub fn new(cfg: &QueueConfig) -> Self {
        let uri = AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: cfg.username.clone(),
                    password: cfg.password.clone(),
                },
                host: cfg.host.clone(),
                port: cfg.port,
            },
            vhost: cfg.vhost.clone(),
            ..AMQPUri::default()
        };

        Self {
            uri,
            queue: cfg.queue.clone(),
            exchange: cfg.exchange.clone(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    type Handle = AmqpChannel;

    async fn connect(&self) -> Result<AmqpChannel, BrokerError> {
        let connection = Connection::connect_uri(self.uri.clone(), ConnectionProperties::default())
            .await
            .map_err(|err| BrokerError::Connect(err.to_string()))?;

        match open_channel(&connection, &self.queue).await {
            Ok(channel) => {
                debug!(
                    host = %self.uri.authority.host,
                    queue = %self.queue,
                    "queuer: AMQP channel ready"
                );
                Ok(AmqpChannel {
                    connection,
                    channel,
                })
            }
            Err(err) => {
                // best-effort close of the half-open connection
                let _ = connection.close(REPLY_SUCCESS, "channel setup failed").await;
                Err(err)
            }
        }
    }

    async fn publish(&self, handle: &AmqpChannel, payload: &[u8]) -> Result<(), BrokerError> {
        if !handle.connection.status().connected() || !handle.channel.status().connected() {
            return Err(BrokerError::Publish("connection is no longer open".into()));
        }

        let confirmation = handle
            .channel
            .basic_publish(
                &self.exchange,
                &self.queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT)
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|err| BrokerError::Publish(err.to_string()))?
            .await
            .map_err(|err| BrokerError::Publish(err.to_string()))?;

        if let Confirmation::Nack(_) = confirmation {
            return Err(BrokerError::Publish("broker rejected the message".into()));
        }
        Ok(())
    }

    async fn close(&self, handle: &AmqpChannel) {
        if !handle.connection.status().connected() {
            return;
        }
        if let Err(err) = handle
            .connection
            .close(REPLY_SUCCESS, "publisher discarded connection")
            .await
        {
            debug!(error = %err, "queuer: closing AMQP connection failed");
        }
    }
}

async fn open_channel(connection: &Connection, queue: &str) -> Result<Channel, BrokerError> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|err| BrokerError::Channel(err.to_string()))?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(|err| BrokerError::Channel(err.to_string()))?;
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|err| BrokerError::Channel(err.to_string()))?;
    Ok(channel)
}
