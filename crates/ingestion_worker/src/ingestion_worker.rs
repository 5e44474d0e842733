use crate::domain::IngestionService;
use crate::mqtt::{MqttSubscriberConfig, run_mqtt_subscriber};
use common::domain::{SensorRewarder, TelemetryEventRepository};
use sensor_runner::AppProcess;
use std::sync::Arc;
use tracing::info;

/// Wires the ingestion pipeline to the MQTT transport
pub struct IngestionWorker {
    service: Arc<IngestionService>,
    config: MqttSubscriberConfig,
}

impl IngestionWorker {
    pub fn new(
        repository: Arc<dyn TelemetryEventRepository>,
        rewarder: Arc<dyn SensorRewarder>,
        config: MqttSubscriberConfig,
    ) -> Self {
        info!(
            host = %config.host,
            port = config.port,
            topic_filter = %config.topic_filter,
            "initializing ingestion worker"
        );

        Self {
            service: Arc::new(IngestionService::new(repository, rewarder)),
            config,
        }
    }

    pub fn service(&self) -> Arc<IngestionService> {
        Arc::clone(&self.service)
    }

    pub fn into_runner_process(self) -> AppProcess {
        let Self { service, config } = self;
        Box::new(move |ctx| Box::pin(async move { run_mqtt_subscriber(config, service, ctx).await }))
    }
}
