use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One sensor reading as delivered by the transport.
///
/// Events are persisted verbatim and never mutated afterwards. The same
/// `(sensor_id, timestamp_ms)` pair may appear more than once.
///
/// The wire format accepts both the generator's PascalCase field names
/// (`SensorId`, `Type`, `Value`, `Timestamp`) and camelCase ones; it is
/// always written back as camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    #[serde(alias = "SensorId")]
    pub sensor_id: String,
    #[serde(rename = "type", alias = "Type")]
    pub event_type: String,
    #[serde(alias = "Value")]
    pub value: f64,
    /// Unix epoch milliseconds
    #[serde(alias = "Timestamp", alias = "timestamp")]
    pub timestamp_ms: i64,
}

impl TelemetryEvent {
    pub fn new(
        sensor_id: impl Into<String>,
        event_type: impl Into<String>,
        value: f64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            event_type: event_type.into(),
            value,
            timestamp_ms,
        }
    }
}

/// Input for fetching stored events, optionally restricted to one type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindEventsRepoInput {
    pub event_type: Option<String>,
}

/// Input for fetching the most recent events of a single sensor
#[derive(Debug, Clone, PartialEq)]
pub struct LatestEventsRepoInput {
    pub sensor_id: String,
    pub limit: usize,
}

/// Repository trait for telemetry event storage
///
/// The store is append-only from the point of view of this workspace:
/// nothing updates or deletes events. Implementations provide their own
/// concurrency control for concurrent readers and writers.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TelemetryEventRepository: Send + Sync {
    /// Append a single event. No deduplication is performed.
    async fn insert(&self, event: &TelemetryEvent) -> DomainResult<()>;

    /// Fetch all events, or only those whose type equals `event_type`
    async fn find(&self, input: FindEventsRepoInput) -> DomainResult<Vec<TelemetryEvent>>;

    /// Every sensor id present in the store, once each
    async fn distinct_sensor_ids(&self) -> DomainResult<Vec<String>>;

    /// Up to `limit` events for one sensor, newest timestamp first
    async fn latest_for_sensor(
        &self,
        input: LatestEventsRepoInput,
    ) -> DomainResult<Vec<TelemetryEvent>>;
}
