//! RabbitMQ consumer feeding events to the dispatcher.
//!
//! Each message is dispatched in its own task; the channel prefetch bounds
//! how many events are in flight at once. Messages are acked once dispatch
//! returns, whatever the delivery outcomes were, because failures are already
//! recorded on delivery rows. Messages that do not parse are rejected without
//! requeue so they cannot loop forever.
//!
//! On shutdown the consumer stops taking messages, waits for every dispatch
//! in flight to finish and ack, and only then closes the connection.

use std::future::Future;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    Connection, ConnectionProperties,
};
use tracing::{error, info, warn};

use super::types::{EventMessage, EVENTS_QUEUE};
use crate::delivery::Dispatcher;
use crate::tasks::BackgroundTasks;

/// Consume events until `shutdown` resolves or the broker closes the stream.
pub async fn run(
    url: &str,
    prefetch: u16,
    dispatcher: Dispatcher,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    info!(url_length = url.len(), "rabbitmq_connecting");

    let conn = Connection::connect(url, ConnectionProperties::default())
        .await
        .context("Failed to connect to RabbitMQ")?;

    let channel = conn.create_channel().await.context("Failed to create channel")?;

    channel
        .basic_qos(prefetch, BasicQosOptions::default())
        .await
        .context("Failed to set QoS")?;

    channel
        .queue_declare(
            EVENTS_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare queue")?;

    let mut consumer = channel
        .basic_consume(
            EVENTS_QUEUE,
            "huduglue-webhooks",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(
        queue = EVENTS_QUEUE,
        prefetch_count = prefetch,
        "rabbitmq_consumer_started"
    );

    let tasks = BackgroundTasks::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("rabbitmq_consumer_stopping");
                break;
            }
            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        let delivery_tag = delivery.delivery_tag;
                        let message_id = delivery
                            .properties
                            .message_id()
                            .as_ref()
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "unknown".to_string());

                        let dispatcher = dispatcher.clone();
                        let channel = channel.clone();

                        tasks.spawn(async move {
                            match serde_json::from_slice::<EventMessage>(&delivery.data) {
                                Ok(message) => {
                                    let delivered = dispatcher
                                        .dispatch(
                                            message.event,
                                            &message.data,
                                            message.organization.as_ref(),
                                        )
                                        .await;

                                    info!(
                                        message_id = %message_id,
                                        event = %message.event,
                                        delivered = delivered,
                                        "rabbitmq_event_dispatched"
                                    );

                                    if let Err(e) = channel
                                        .basic_ack(delivery_tag, BasicAckOptions::default())
                                        .await
                                    {
                                        error!(
                                            delivery_tag = delivery_tag,
                                            error = %e,
                                            "rabbitmq_ack_failed"
                                        );
                                    }
                                }
                                Err(e) => {
                                    error!(
                                        message_id = %message_id,
                                        error = %e,
                                        "rabbitmq_event_parse_failed"
                                    );

                                    if let Err(nack_err) = channel
                                        .basic_nack(
                                            delivery_tag,
                                            BasicNackOptions {
                                                requeue: false,
                                                ..Default::default()
                                            },
                                        )
                                        .await
                                    {
                                        error!(
                                            delivery_tag = delivery_tag,
                                            error = %nack_err,
                                            "rabbitmq_nack_failed"
                                        );
                                    }
                                }
                            }
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "rabbitmq_delivery_error");
                    }
                    None => {
                        warn!("rabbitmq_consumer_closed");
                        break;
                    }
                }
            }
        }
    }

    tasks.drain().await;

    if let Err(e) = conn.close(200, "Normal shutdown").await {
        warn!(error = %e, "rabbitmq_connection_close_error");
    }

    info!("rabbitmq_consumer_shutdown_complete");
    Ok(())
}
