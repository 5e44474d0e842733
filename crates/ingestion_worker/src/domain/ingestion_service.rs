use crate::domain::decode_telemetry_event;
use common::domain::{SensorRewarder, TelemetryEventRepository};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// What happened to one raw payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionOutcome {
    /// Payload could not be decoded; nothing was stored
    Discarded,
    /// Payload decoded but the store rejected it; nothing was settled
    PersistFailed,
    /// Event stored; `settlement_requested` is false for an empty sensor id
    Persisted { settlement_requested: bool },
}

/// Domain service for the decode → persist → settle pipeline
///
/// Each stage is isolated from the next: a bad payload or a failed write
/// is logged and reported as an outcome, and settlement is handed off
/// without waiting for it.
pub struct IngestionService {
    repository: Arc<dyn TelemetryEventRepository>,
    rewarder: Arc<dyn SensorRewarder>,
}

impl IngestionService {
    pub fn new(
        repository: Arc<dyn TelemetryEventRepository>,
        rewarder: Arc<dyn SensorRewarder>,
    ) -> Self {
        Self {
            repository,
            rewarder,
        }
    }

    /// Run one raw payload through the pipeline. Never fails.
    #[instrument(skip(self, payload), fields(payload_size = payload.len()))]
    pub async fn ingest_payload(&self, payload: &[u8]) -> IngestionOutcome {
        // 1. Decode
        let event = match decode_telemetry_event(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "discarding malformed telemetry payload");
                return IngestionOutcome::Discarded;
            }
        };

        // 2. Persist
        if let Err(e) = self.repository.insert(&event).await {
            error!(
                sensor_id = %event.sensor_id,
                event_type = %event.event_type,
                error = %e,
                "failed to persist telemetry event, discarding"
            );
            return IngestionOutcome::PersistFailed;
        }

        debug!(
            sensor_id = %event.sensor_id,
            event_type = %event.event_type,
            value = event.value,
            timestamp_ms = event.timestamp_ms,
            "persisted telemetry event"
        );

        // 3. Settle, detached
        if event.sensor_id.is_empty() {
            debug!("event has no sensor id, skipping settlement");
            return IngestionOutcome::Persisted {
                settlement_requested: false,
            };
        }

        self.rewarder.settle(&event.sensor_id);

        IngestionOutcome::Persisted {
            settlement_requested: true,
        }
    }
}
