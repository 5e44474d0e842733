use crate::domain::IngestionService;
use crate::mqtt::parse_topic;
use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, instrument, warn};

/// Broker connection settings for the telemetry subscriber
#[derive(Debug, Clone)]
pub struct MqttSubscriberConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic_filter: String,
    pub keep_alive: Duration,
    pub retry_delay: Duration,
    /// Consecutive failed sessions tolerated before giving up; 0 retries forever
    pub max_retry_attempts: u32,
}

/// Run the MQTT subscriber until cancelled
///
/// Reconnects after connection errors. A session that reached ConnAck
/// resets the failure count. Returns an error once `max_retry_attempts`
/// consecutive sessions have failed.
#[instrument(
    name = "mqtt_subscriber",
    skip_all,
    fields(host = %config.host, port = config.port, topic_filter = %config.topic_filter)
)]
pub async fn run_mqtt_subscriber(
    config: MqttSubscriberConfig,
    service: Arc<IngestionService>,
    ctx: CancellationToken,
) -> Result<()> {
    info!("starting MQTT subscriber");

    let mut retry_count: u32 = 0;

    loop {
        if ctx.is_cancelled() {
            break;
        }

        match run_mqtt_connection(&config, &ctx, Arc::clone(&service), &mut retry_count).await {
            Ok(()) => {
                debug!("MQTT subscriber stopped cleanly");
                break;
            }
            Err(e) => {
                error!(error = %e, "MQTT connection error");

                retry_count += 1;
                if config.max_retry_attempts > 0 && retry_count >= config.max_retry_attempts {
                    error!(
                        max_retries = config.max_retry_attempts,
                        "max retry attempts reached, stopping MQTT subscriber"
                    );
                    return Err(e.context(format!(
                        "MQTT subscriber gave up after {} attempts",
                        retry_count
                    )));
                }

                warn!(
                    attempt = retry_count,
                    max_attempts = config.max_retry_attempts,
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = tokio::time::sleep(config.retry_delay) => {}
                }
            }
        }
    }

    info!("MQTT subscriber stopped");
    Ok(())
}

async fn run_mqtt_connection(
    config: &MqttSubscriberConfig,
    ctx: &CancellationToken,
    service: Arc<IngestionService>,
    retry_count: &mut u32,
) -> Result<()> {
    let mut mqtt_options = MqttOptions::new(&config.client_id, &config.host, config.port);
    mqtt_options.set_keep_alive(config.keep_alive);
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    client
        .subscribe(&config.topic_filter, QoS::AtMostOnce)
        .await
        .context("failed to subscribe")?;

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!("shutdown signal received");
                let _ = client.disconnect().await;
                return Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        // Awaited inline so delivery order is persistence order
                        handle_mqtt_message(&publish.topic, &publish.payload, &service).await;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        *retry_count = 0;
                        info!("connected to MQTT broker");
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!(topic_filter = %config.topic_filter, "subscription acknowledged");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(anyhow::anyhow!("MQTT event loop error: {}", e));
                    }
                }
            }
        }
    }
}

/// Handle one incoming MQTT message in its own trace
pub(crate) async fn handle_mqtt_message(topic: &str, payload: &[u8], service: &IngestionService) {
    let span = info_span!(
        parent: Span::none(),
        "telemetry_message",
        topic = %topic,
        payload_size = payload.len(),
        sensor_id = tracing::field::Empty,
    );

    async {
        match parse_topic(topic) {
            Some(parsed) => {
                if let Some(sensor_id) = &parsed.sensor_id {
                    Span::current().record("sensor_id", sensor_id.as_str());
                }
            }
            None => debug!("topic outside the sensors tree, relying on payload"),
        }

        let outcome = service.ingest_payload(payload).await;
        debug!(?outcome, "message handled");
    }
    .instrument(span)
    .await
}
